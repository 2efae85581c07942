//! Tests for configuration constants and their relationships

#[cfg(test)]
mod tests {
    use tilemosaic::io::configuration::{
        BYTES_PER_GB, DEFAULT_MAX_SIZE_GB, DEFAULT_PIXEL_SIZE, DEFAULT_SOURCE_SIZE,
        DEFAULT_WORKERS, FREQUENT_COLOR_THRESHOLD, JPEG_QUALITY, POLL_INTERVAL, QUEUE_CAPACITY,
        REPORT_INTERVAL, SUBMIT_TIMEOUT, TILE_EXTENSIONS, WRITE_BATCH_SIZE,
    };

    // Tests pipeline tuning values are usable
    // Verified by setting queue capacity to zero
    #[test]
    fn test_pipeline_constants_positive() {
        assert!(DEFAULT_WORKERS > 0);
        assert!(QUEUE_CAPACITY > 0);
        assert!(WRITE_BATCH_SIZE > 0);
        assert!(!SUBMIT_TIMEOUT.is_zero());
        assert!(!POLL_INTERVAL.is_zero());
        assert!(REPORT_INTERVAL > POLL_INTERVAL);
    }

    // Tests the documented defaults
    // Verified by changing the default pixel size
    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_WORKERS, 12);
        assert_eq!(DEFAULT_PIXEL_SIZE, 64);
        assert_eq!(DEFAULT_SOURCE_SIZE, 128);
        assert_eq!(DEFAULT_MAX_SIZE_GB, 4);
        assert_eq!(FREQUENT_COLOR_THRESHOLD, 16);
        assert_eq!(JPEG_QUALITY, 100);
        assert_eq!(BYTES_PER_GB, 1 << 30);
    }

    // Tests tile extensions are lowercase so case-insensitive matching works
    // Verified by adding an uppercase extension
    #[test]
    fn test_tile_extensions_lowercase() {
        for ext in TILE_EXTENSIONS {
            assert_eq!(ext, ext.to_ascii_lowercase());
        }
        assert!(TILE_EXTENSIONS.contains(&"gif"));
    }
}
