use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{ClipInfo, MediaBackend, Result};

/// Registry of probed clips, keyed by path. A clip referenced by several
/// layers is probed once.
#[derive(Debug, Default)]
pub struct AssetStore {
    clips: HashMap<PathBuf, ClipInfo>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
        }
    }

    pub fn register(&mut self, info: ClipInfo) {
        self.clips.insert(info.path.clone(), info);
    }

    pub fn clip(&self, path: &Path) -> Option<&ClipInfo> {
        self.clips.get(path)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Returns the cached info for `path`, probing it through `backend` on
    /// first use.
    pub fn load_clip(&mut self, backend: &dyn MediaBackend, path: &Path) -> Result<ClipInfo> {
        if let Some(info) = self.clips.get(path) {
            return Ok(info.clone());
        }

        let info = backend.probe_clip(path)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration = info.duration,
            "probed clip"
        );
        self.register(info.clone());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{CameliaError, Song};

    #[derive(Default)]
    struct CountingBackend {
        probes: Cell<usize>,
    }

    impl MediaBackend for CountingBackend {
        fn probe_clip(&self, path: &Path) -> Result<ClipInfo> {
            self.probes.set(self.probes.get() + 1);
            if path.ends_with("missing.mp4") {
                return Err(CameliaError::media("No such file or directory"));
            }
            Ok(ClipInfo {
                path: path.to_path_buf(),
                width: 320,
                height: 240,
                duration: 1.5,
            })
        }

        fn decode_song(&self, _path: &Path) -> Result<Song> {
            Song::new(Vec::new(), 44_100, 2)
        }
    }

    #[test]
    fn probes_each_clip_once() {
        let backend = CountingBackend::default();
        let mut store = AssetStore::new();

        let first = store.load_clip(&backend, Path::new("loop.mp4")).unwrap();
        let second = store.load_clip(&backend, Path::new("loop.mp4")).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.probes.get(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn registered_clips_skip_probing() {
        let backend = CountingBackend::default();
        let mut store = AssetStore::new();
        store.register(ClipInfo {
            path: PathBuf::from("known.gif"),
            width: 100,
            height: 100,
            duration: 3.0,
        });

        let info = store.load_clip(&backend, Path::new("known.gif")).unwrap();
        assert_eq!(info.duration, 3.0);
        assert_eq!(backend.probes.get(), 0);
    }

    #[test]
    fn probe_failures_are_not_cached() {
        let backend = CountingBackend::default();
        let mut store = AssetStore::new();

        let err = store
            .load_clip(&backend, Path::new("missing.mp4"))
            .unwrap_err();
        assert!(format!("{err}").contains("No such file"));
        assert!(store.is_empty());
        assert!(store.clip(Path::new("missing.mp4")).is_none());
    }
}
