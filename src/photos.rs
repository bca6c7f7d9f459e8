use std::path::{Path, PathBuf};

use serde::Serialize;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Photo {
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
}

impl Photo {
    /// HEIC files can be listed and downloaded but browsers won't render them.
    pub fn is_heic(&self) -> bool {
        self.name.to_lowercase().ends_with(".heic")
    }
}

/// Photos in `dir`, sorted by path. A missing directory has no photos.
pub fn list_photos(dir: &Path) -> std::io::Result<Vec<Photo>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(err),
    };

    let mut photos = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let is_photo = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| PHOTO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);

        let name = path.file_name().and_then(|name| name.to_str()).map(str::to_owned);

        if let (true, Some(name)) = (is_photo, name) {
            photos.push(Photo { name, path });
        }
    }

    photos.sort_by(|a, b| a.path.cmp(&b.path));
    photos.dedup_by(|a, b| a.path == b.path);

    Ok(photos)
}
