use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::Error;

/// Previously saved state at `path`. A stub that is missing or unreadable is
/// a cache miss, not an error, and the caller recomputes.
pub fn read_stub<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        log::debug!("no stub at {}", path.display());
        return None;
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            log::warn!("can't open stub {}: {}", path.display(), err);
            return None;
        }
    };

    match serde_json::from_reader(BufReader::new(file)) {
        Ok(value) => {
            log::info!("loaded stub {}", path.display());
            Some(value)
        }
        Err(err) => {
            log::warn!("ignoring corrupt stub {}: {}", path.display(), err);
            None
        }
    }
}

pub fn write_stub<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, value)?;
    log::info!("saved stub {}", path.display());

    Ok(())
}

/// Writes a stub but only logs on failure, the computed value is still good.
pub fn persist<T: Serialize>(path: Option<&Path>, value: &T) {
    if let Some(path) = path {
        if let Err(err) = write_stub(path, value) {
            log::warn!("failed to save stub {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stubs").join("values.json");

        write_stub(&path, &vec![1.5f32, 2.5]).unwrap();
        let back: Option<Vec<f32>> = read_stub(&path);

        assert_eq!(back, Some(vec![1.5, 2.5]));
    }

    #[test]
    fn missing_or_corrupt_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");

        assert_eq!(read_stub::<Vec<f32>>(&path), None);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(read_stub::<Vec<f32>>(&path), None);
    }
}
