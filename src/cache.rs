// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// 64-bit FNV-1a hash.
pub fn fingerprint(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// A directory of small text cache entries, grouped into sections. Entries are addressed
/// either by a caller-chosen name or by the fingerprint of some key data.
#[derive(Clone, Debug)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: &Path) -> Cache {
        Cache {
            dir: dir.to_path_buf(),
        }
    }

    fn entry_path(&self, section: &str, name: &str) -> PathBuf {
        self.dir.join(section).join(format!("{}.cache", name))
    }

    pub fn get_by_name(&self, section: &str, name: &str) -> Option<String> {
        let path = self.entry_path(section, name);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                debug!(section, name, "Cache hit.");
                Some(contents)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(err = %e, path = %path.display(), "Unable to read cache entry");
                None
            }
        }
    }

    pub fn set_by_name(&self, section: &str, name: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(self.dir.join(section))?;
        fs::write(self.entry_path(section, name), contents)
    }

    pub fn get_by_data(&self, section: &str, key: &str) -> Option<String> {
        self.get_by_name(section, &fingerprint(key.as_bytes()).to_string())
    }

    pub fn set_by_data(&self, section: &str, key: &str, contents: &str) -> io::Result<()> {
        self.set_by_name(section, &fingerprint(key.as_bytes()).to_string(), contents)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_fingerprint() {
        // Reference values for 64-bit FNV-1a.
        assert_eq!(0xcbf29ce484222325, fingerprint(b""));
        assert_eq!(0xaf63dc4c8601ec8c, fingerprint(b"a"));
        assert_ne!(fingerprint(b"ab"), fingerprint(b"ba"));
    }

    #[test]
    fn test_entries() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path());

        assert_eq!(None, cache.get_by_name("effects", "valid"));
        cache.set_by_name("effects", "valid", "1,2,3")?;
        assert_eq!(Some("1,2,3".to_string()), cache.get_by_name("effects", "valid"));

        cache.set_by_data("visualiser", "song.wav:1:2", "{}")?;
        assert_eq!(
            Some("{}".to_string()),
            cache.get_by_data("visualiser", "song.wav:1:2")
        );
        assert_eq!(None, cache.get_by_data("visualiser", "song.wav:1:3"));
        Ok(())
    }
}
