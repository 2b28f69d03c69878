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

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// The file name without its extension, e.g. "song" for "audio/song.mp3".
pub fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}

/// Outputs the given duration in a minutes:seconds format.
pub fn duration_minutes_seconds(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

/// Lists the regular files in `dir` whose extension passes `accept`, sorted by name.
pub fn list_files(dir: &Path, accept: impl Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && accept(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_duration_minutes_strings() {
        assert_eq!("0:00", duration_minutes_seconds(Duration::new(0, 0)));
        assert_eq!("0:55", duration_minutes_seconds(Duration::new(55, 0)));
        assert_eq!("2:05", duration_minutes_seconds(Duration::new(125, 0)));
        assert_eq!("60:06", duration_minutes_seconds(Duration::new(3606, 0)));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!("song", file_stem("song.mp3"));
        assert_eq!("song", file_stem("audio/song.mp3"));
        assert_eq!("plain", file_stem("plain"));
    }

    #[test]
    fn test_list_files() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b.yaml"), "")?;
        fs::write(dir.path().join("a.yaml"), "")?;
        fs::write(dir.path().join("c.txt"), "")?;
        fs::create_dir(dir.path().join("d.yaml"))?;

        let files = list_files(dir.path(), |path| {
            path.extension().is_some_and(|ext| ext == "yaml")
        })?;
        assert_eq!(
            vec![dir.path().join("a.yaml"), dir.path().join("b.yaml")],
            files
        );
        Ok(())
    }
}
