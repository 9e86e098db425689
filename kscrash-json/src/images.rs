// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Lookup of the binary image that owns an address.

use std::collections::HashMap;

use uuid::Uuid;

use crate::schema::BinaryImage;

/// The final path component of `path`.
pub fn basename(path: &str) -> &str {
    match path.rfind(|c| c == '/' || c == '\\') {
        None => path,
        Some(index) => &path[(index + 1)..],
    }
}

/// Normalize a build identifier: lowercase, no hyphens.
pub fn normalize_build_id(uuid: &str) -> String {
    match Uuid::parse_str(uuid) {
        Ok(parsed) => parsed.simple().to_string(),
        Err(_) => uuid.to_lowercase().replace('-', ""),
    }
}

impl BinaryImage {
    pub fn short_name(&self) -> &str {
        basename(&self.name)
    }

    /// The build identifier in its normalized form, empty if the image has none.
    pub fn build_id(&self) -> String {
        self.uuid
            .as_deref()
            .map(normalize_build_id)
            .unwrap_or_default()
    }

    /// The last address inside the image.
    pub fn end_address(&self) -> u64 {
        self.image_addr.saturating_add(self.image_size.max(1)) - 1
    }

    /// Whether `address` lies in `[image_addr, image_addr + image_size]`.
    ///
    /// The upper bound is inclusive: a return address just past the end of
    /// the last function still belongs to the image.
    pub fn contains(&self, address: u64) -> bool {
        self.image_addr <= address && address <= self.image_addr.saturating_add(self.image_size)
    }
}

/// The images of one report, indexed for frame attribution.
#[derive(Debug)]
pub struct ImageTable<'a> {
    images: &'a [BinaryImage],
    by_name: HashMap<&'a str, &'a BinaryImage>,
}

impl<'a> ImageTable<'a> {
    pub fn new(images: &'a [BinaryImage]) -> Self {
        let mut by_name = HashMap::with_capacity(images.len());
        for image in images {
            // First image with a given short name wins.
            by_name.entry(image.short_name()).or_insert(image);
        }
        ImageTable { images, by_name }
    }

    pub fn by_short_name(&self, name: &str) -> Option<&'a BinaryImage> {
        self.by_name.get(name).copied()
    }

    /// The first image, in report order, whose range contains `address`.
    pub fn containing(&self, address: u64) -> Option<&'a BinaryImage> {
        self.images.iter().find(|image| image.contains(address))
    }

    /// Find the image for a frame: by short name first, then by address.
    pub fn lookup(&self, short_name: Option<&str>, address: u64) -> Option<&'a BinaryImage> {
        short_name
            .and_then(|name| self.by_short_name(name))
            .or_else(|| self.containing(address))
    }

    /// All images ordered by load address; images at the same address keep report order.
    pub fn by_addr(&self) -> Vec<&'a BinaryImage> {
        let mut sorted: Vec<_> = self.images.iter().collect();
        sorted.sort_by_key(|image| image.image_addr);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, image_addr: u64, image_size: u64) -> BinaryImage {
        BinaryImage {
            name: name.to_owned(),
            uuid: Some("4C4C4416-5555-3144-A1E2-4B8B5F3C0D2E".to_owned()),
            image_addr,
            image_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/usr/lib/libobjc.A.dylib"), "libobjc.A.dylib");
        assert_eq!(basename("c:\\test_app.exe"), "test_app.exe");
        assert_eq!(basename("Demo"), "Demo");
    }

    #[test]
    fn test_normalize_build_id() {
        assert_eq!(
            normalize_build_id("4C4C4416-5555-3144-A1E2-4B8B5F3C0D2E"),
            "4c4c441655553144a1e24b8b5f3c0d2e"
        );
        assert_eq!(normalize_build_id("AB-CD"), "abcd");
    }

    #[test]
    fn test_range_containment() {
        let images = [image("/a/One", 0x1000, 0x100), image("/a/Two", 0x2000, 0x100)];
        let table = ImageTable::new(&images);

        assert_eq!(table.containing(0x1000).unwrap().short_name(), "One");
        assert_eq!(table.containing(0x1100).unwrap().short_name(), "One");
        assert_eq!(table.containing(0x2050).unwrap().short_name(), "Two");
        assert!(table.containing(0x1101).is_none());
        assert!(table.containing(0xfff).is_none());
    }

    #[test]
    fn test_lookup_prefers_name() {
        let images = [image("/a/One", 0x1000, 0x100), image("/a/Two", 0x2000, 0x100)];
        let table = ImageTable::new(&images);

        assert_eq!(table.lookup(Some("Two"), 0x1010).unwrap().short_name(), "Two");
        assert_eq!(table.lookup(Some("Nope"), 0x1010).unwrap().short_name(), "One");
        assert_eq!(table.lookup(None, 0x2010).unwrap().short_name(), "Two");
        assert!(table.lookup(Some("Nope"), 0x9000).is_none());
    }

    #[test]
    fn test_first_name_wins() {
        let images = [image("/a/Dup", 0x1000, 0x10), image("/b/Dup", 0x2000, 0x10)];
        let table = ImageTable::new(&images);
        assert_eq!(table.by_short_name("Dup").unwrap().image_addr, 0x1000);
    }

    #[test]
    fn test_by_addr() {
        let images = [
            image("/a/High", 0x3000, 0x10),
            image("/a/Low", 0x1000, 0x10),
            image("/a/Mid", 0x2000, 0x10),
        ];
        let table = ImageTable::new(&images);
        let names: Vec<_> = table.by_addr().iter().map(|i| i.short_name()).collect();
        assert_eq!(names, ["Low", "Mid", "High"]);
        assert_eq!(images[0].end_address(), 0x300f);
    }
}
