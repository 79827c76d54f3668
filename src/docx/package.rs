use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// In-memory image of a `.docx` container. Entry order is preserved on write.
#[derive(Clone, Debug, Default)]
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

#[derive(Clone, Debug)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxEntry {
    pub fn file(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        }
    }
}

impl DocxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        Self::from_reader(f).with_context(|| format!("read docx: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).context("read zip entry")?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> anyhow::Result<W> {
        let mut zout = ZipWriter::new(writer);
        for ent in &self.entries {
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(&ent.data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        zout.finish().context("finish zip")
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Serializes fully in memory before touching `output_path`, so a failure never leaves
    /// a truncated package behind.
    pub fn write(&self, output_path: &Path) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(output_path, bytes)
            .with_context(|| format!("write output docx: {}", output_path.display()))
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        let name = name.trim_start_matches('/');
        self.entries
            .iter()
            .find(|e| e.name == name || e.name.eq_ignore_ascii_case(name))
    }

    pub fn data(&self, name: &str) -> Option<&[u8]> {
        self.entry(name).map(|e| e.data.as_slice())
    }

    /// Inserts or replaces a file entry.
    pub fn put(&mut self, name: &str, data: Vec<u8>) {
        if let Some(ent) = self.entries.iter_mut().find(|e| e.name == name) {
            ent.data = data;
            return;
        }
        self.entries.push(DocxEntry::file(name, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_round_trip_in_memory() {
        let mut pkg = DocxPackage::default();
        pkg.put("[Content_Types].xml", b"<Types/>".to_vec());
        pkg.put("word/document.xml", b"<w:document/>".to_vec());
        pkg.put("word/document.xml", b"<w:document>x</w:document>".to_vec());

        let bytes = pkg.to_bytes().expect("zip");
        let back = DocxPackage::from_bytes(&bytes).expect("unzip");
        assert_eq!(back.entries.len(), 2);
        assert_eq!(back.entries[0].name, "[Content_Types].xml");
        assert_eq!(
            back.data("/word/document.xml"),
            Some(&b"<w:document>x</w:document>"[..])
        );
    }

    #[test]
    fn not_a_zip_is_an_error() {
        assert!(DocxPackage::from_bytes(b"plain text").is_err());
    }
}
