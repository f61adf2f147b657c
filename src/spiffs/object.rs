use core::fmt;

use super::page::SpiffsPage;

/// Pages of one object id, grouped by status and kind.
///
/// `filename` and `contents` follow the last used header and data page seen
/// in physical order; earlier values are overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiffsObject {
    pub object_id: u8,
    pub used_head: Vec<SpiffsPage>,
    pub used_data: Vec<SpiffsPage>,
    pub old_head: Vec<SpiffsPage>,
    pub old_data: Vec<SpiffsPage>,
    pub filename: Option<String>,
    pub contents: Option<Vec<u8>>,
}

impl SpiffsObject {
    pub fn new(object_id: u8) -> Self {
        Self {
            object_id,
            used_head: Vec::new(),
            used_data: Vec::new(),
            old_head: Vec::new(),
            old_data: Vec::new(),
            filename: None,
            contents: None,
        }
    }

    /// File `page` into its group. Pages of another object are ignored.
    pub fn add_page(&mut self, page: SpiffsPage) {
        if page.object_id != Some(self.object_id) {
            return;
        }

        let is_header = page.is_header == Some(true);
        if page.is_used() {
            if is_header {
                if let Some(name) = page.name() {
                    self.filename = Some(name);
                }
                self.used_head.push(page);
            } else {
                // Index pages and empty payloads leave the contents alone.
                if let Some(contents) = page.contents.as_ref().filter(|c| !c.is_empty()) {
                    self.contents = Some(contents.clone());
                }
                self.used_data.push(page);
            }
        } else if is_header {
            self.old_head.push(page);
        } else {
            self.old_data.push(page);
        }
    }
}

impl fmt::Display for SpiffsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:20} header+data pages: {}+{}, deleted: {}+{}\n    `{}`",
            self.object_id,
            self.filename.as_deref().unwrap_or("-"),
            self.used_head.len(),
            self.used_data.len(),
            self.old_head.len(),
            self.old_data.len(),
            self.contents
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default(),
        )
    }
}
