//! Store configuration.

/// Default number of pages kept resident in memory.
pub const DEFAULT_IN_MEMORY_PAGES: u8 = 100;

/// Default maximum number of live records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

/// Default bucket capacity requested when `create_index` is given zero.
pub const DEFAULT_INDEX_CAPACITY: u64 = 100_000;

/// Configuration for opening a store.
///
/// `charset`, `in_memory_pages` and `page_size` only apply when a new file
/// is created; an existing file keeps the values recorded in its header.
#[derive(Debug, Clone)]
pub struct Config {
    /// Charset name recorded in the header (at most 16 bytes).
    pub charset: String,

    /// Page cache capacity.
    pub in_memory_pages: u8,

    /// Maximum number of live records per page.
    pub page_size: u32,

    /// Bucket capacity used when an index is created with capacity zero.
    pub default_index_capacity: u64,

    /// Whether to create the file if it is missing or empty.
    pub create_if_missing: bool,

    /// Whether `close` flushes and fsyncs the backend.
    pub sync_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            charset: "utf8".to_string(),
            in_memory_pages: DEFAULT_IN_MEMORY_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            default_index_capacity: DEFAULT_INDEX_CAPACITY,
            create_if_missing: true,
            sync_on_close: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the charset name written to new files.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Sets the page cache capacity for new files.
    #[must_use]
    pub const fn in_memory_pages(mut self, pages: u8) -> Self {
        self.in_memory_pages = pages;
        self
    }

    /// Sets the maximum live records per page for new files.
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the default index capacity.
    #[must_use]
    pub const fn default_index_capacity(mut self, capacity: u64) -> Self {
        self.default_index_capacity = capacity;
        self
    }

    /// Sets whether to create the file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether `close` syncs the file to disk.
    #[must_use]
    pub const fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.charset, "utf8");
        assert_eq!(config.in_memory_pages, 100);
        assert_eq!(config.page_size, 10_000);
        assert!(config.create_if_missing);
        assert!(config.sync_on_close);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .charset("latin1")
            .page_size(4)
            .in_memory_pages(2)
            .create_if_missing(false);

        assert_eq!(config.charset, "latin1");
        assert_eq!(config.page_size, 4);
        assert_eq!(config.in_memory_pages, 2);
        assert!(!config.create_if_missing);
    }
}
