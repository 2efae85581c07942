//! Tests for canvas planning, placement, composition and parallel generation

#[cfg(test)]
mod tests {
    use crate::fixtures::solid_tile;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::path::Path;
    use std::sync::Arc;
    use tilemosaic::MosaicError;
    use tilemosaic::io::image::ScaleAlgorithm;
    use tilemosaic::math::color::Rgb;
    use tilemosaic::mosaic::compositor::{
        CanvasPlan, GenerationOptions, MosaicGrid, Placement, generate_mosaic, is_fatal,
    };
    use tilemosaic::mosaic::matcher::{MatchCache, MatchEngine};
    use tilemosaic::mosaic::source::SourceImage;
    use tilemosaic::store::database::{Namespace, TileStore};
    use tilemosaic::store::record::{ContentHash, TileRecord};

    fn engine(dir: &Path, tiles: &[(&str, [u8; 3])]) -> Arc<MatchEngine> {
        let labelled: Vec<_> = tiles
            .iter()
            .map(|&(name, [r, g, b])| (name, [r, g, b], Rgb::new(r, g, b)))
            .collect();
        engine_with_colors(dir, &labelled)
    }

    // Stored colors may differ from the file contents so equal matches stay distinguishable
    fn engine_with_colors(dir: &Path, tiles: &[(&str, [u8; 3], Rgb)]) -> Arc<MatchEngine> {
        let Ok(store) = TileStore::open(&dir.join("db.bin"), &Namespace::new("default", 4)) else {
            unreachable!("store should open");
        };
        let records: Vec<_> = tiles
            .iter()
            .map(|&(name, rgb, color)| {
                let path = solid_tile(dir, name, 4, rgb);
                TileRecord {
                    path: path.to_string_lossy().into_owned(),
                    color,
                    hash: ContentHash::from_bytes(name.as_bytes()),
                }
            })
            .collect();
        assert!(store.put_batch(&records).is_ok());
        Arc::new(MatchEngine::new(
            Arc::new(store),
            Arc::new(MatchCache::new()),
            4,
            ScaleAlgorithm::NearestNeighbor,
        ))
    }

    fn source(pixels: &[[u8; 3]], width: u32) -> SourceImage {
        let height = pixels.len() as u32 / width;
        let image = RgbaImage::from_fn(width, height, |x, y| {
            let [r, g, b] = pixels
                .get((y * width + x) as usize)
                .copied()
                .unwrap_or_default();
            Rgba([r, g, b, 255])
        });
        SourceImage::from_image(
            &DynamicImage::ImageRgba8(image),
            128,
            ScaleAlgorithm::default(),
        )
    }

    fn options(workers: usize) -> GenerationOptions {
        GenerationOptions {
            workers,
            seed: 42,
            show_progress: false,
        }
    }

    // Tests canvas size is cells times tile size in each direction
    // Verified by swapping rows and columns in height
    #[test]
    fn test_canvas_plan_dimensions() {
        let plan = CanvasPlan::new(3, 2, 64);
        assert_eq!(plan.width(), 192);
        assert_eq!(plan.height(), 128);
        assert_eq!(plan.cell_count(), 6);
        assert_eq!(plan.estimated_bytes(), 192 * 128 * 4);
    }

    // Tests the size cap is exclusive of the exact limit and rejects overflow
    // Verified by comparing with greater-or-equal
    #[test]
    fn test_check_budget() {
        let plan = CanvasPlan::new(2, 2, 2);
        assert!(plan.check_budget(64).is_ok());
        assert!(matches!(
            plan.check_budget(63),
            Err(MosaicError::OutputTooLarge {
                required_bytes: 64,
                limit_bytes: 63,
            })
        ));

        let huge = CanvasPlan::new(u32::MAX, 1, 2);
        assert!(huge.check_budget(u64::MAX).is_err());
    }

    // Tests each cell accepts one placement and out-of-range cells none
    // Verified by letting a second placement overwrite the first
    #[test]
    fn test_grid_place_once() {
        let grid = MosaicGrid::new(CanvasPlan::new(2, 1, 1));
        let tile = Arc::new(RgbaImage::new(1, 1));
        let placement = || Placement {
            tile: Arc::clone(&tile),
            flipped: false,
        };

        assert!(grid.place(1, 0, placement()));
        assert!(!grid.place(1, 0, placement()));
        assert!(!grid.place(2, 0, placement()));
        assert_eq!(grid.placed(), 1);
        assert!(grid.placement(0, 0).is_none());
    }

    // Tests tiles land at their cell offset, flipped when asked, and empty cells stay transparent
    // Verified by drawing flipped tiles unmirrored
    #[test]
    fn test_compose_offsets_and_flip() {
        let tile = Arc::new(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        }));
        let grid = MosaicGrid::new(CanvasPlan::new(3, 1, 2));
        let plain = Placement {
            tile: Arc::clone(&tile),
            flipped: false,
        };
        let mirrored = Placement {
            tile,
            flipped: true,
        };
        grid.place(0, 0, plain);
        grid.place(1, 0, mirrored);

        let Ok(canvas) = grid.compose() else {
            unreachable!("canvas fits");
        };
        assert_eq!(canvas.dimensions(), (6, 2));
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(1, 0).0, [0, 0, 255, 255]);
        assert_eq!(canvas.get_pixel(2, 0).0, [0, 0, 255, 255]);
        assert_eq!(canvas.get_pixel(3, 0).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(4, 0).0, [0, 0, 0, 0]);
    }

    // Tests the red, red, blue, green source against red, blue and black tiles
    // Verified by matching with the largest distance
    #[test]
    fn test_generate_two_by_two_scenario() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let tiles = [
            ("red.png", [255, 0, 0]),
            ("blue.png", [0, 0, 255]),
            ("black.png", [0, 0, 0]),
        ];
        let engine = engine(dir.path(), &tiles);
        let source = source(&[[255, 0, 0], [255, 0, 0], [0, 0, 255], [0, 255, 0]], 2);
        let grid = Arc::new(MosaicGrid::new(CanvasPlan::for_source(&source, 4)));

        let report = generate_mosaic(&source, &engine, &grid, &options(2));
        assert!(matches!(report, Ok(ref r) if r.cells == 4 && r.placed == 4 && r.failed == 0));

        let Ok(canvas) = grid.compose() else {
            unreachable!("canvas fits");
        };
        assert_eq!(canvas.dimensions(), (8, 8));
        assert_eq!(canvas.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(5, 1).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(1, 5).0, [0, 0, 255, 255]);
        assert_eq!(canvas.get_pixel(5, 5).0, [0, 0, 0, 255]);
        assert_eq!(engine.cache().scans(), 3);
    }

    // Tests the same seed gives the same placements regardless of worker count
    // Verified by sharing one random generator across workers
    #[test]
    fn test_generate_deterministic() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let recorded = Rgb::new(9, 9, 9);
        let tiles = [
            ("a.png", [200, 0, 0], recorded),
            ("b.png", [0, 200, 0], recorded),
            ("c.png", [0, 0, 200], recorded),
        ];
        let pixels = [[10, 10, 10]; 12];

        let placements = |workers: usize| {
            let engine = engine_with_colors(dir.path(), &tiles);
            let source = source(&pixels, 4);
            let grid = Arc::new(MosaicGrid::new(CanvasPlan::for_source(&source, 4)));
            assert!(generate_mosaic(&source, &engine, &grid, &options(workers)).is_ok());
            (0..3)
                .flat_map(|y| (0..4).map(move |x| (x, y)))
                .map(|(x, y)| {
                    grid.placement(x, y)
                        .map(|p| (p.flipped, p.tile.get_pixel(0, 0).0))
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(placements(1), placements(4));
    }

    // Tests a cell whose only candidate is gone is left empty while the rest render
    // Verified by treating file errors as fatal
    #[test]
    fn test_generate_skips_unloadable_cells() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let engine = engine(
            dir.path(),
            &[("red.png", [255, 0, 0]), ("blue.png", [0, 0, 255])],
        );
        assert!(std::fs::remove_file(dir.path().join("blue.png")).is_ok());

        let source = source(&[[255, 0, 0], [0, 0, 255]], 2);
        let grid = Arc::new(MosaicGrid::new(CanvasPlan::for_source(&source, 4)));
        let report = generate_mosaic(&source, &engine, &grid, &options(2));

        assert!(matches!(report, Ok(ref r) if r.placed == 1 && r.failed == 1));
        assert!(grid.placement(0, 0).is_some());
        assert!(grid.placement(1, 0).is_none());
    }

    // Tests store-level failures are fatal and tile failures are not
    // Verified by treating every error as fatal
    #[test]
    fn test_is_fatal() {
        assert!(is_fatal(&MosaicError::CorruptRecord {
            key: "k".to_string(),
            reason: "r".to_string(),
        }));
        assert!(is_fatal(&MosaicError::NoCandidates {
            color: Rgb::default(),
        }));
        assert!(!is_fatal(&MosaicError::TileTooSmall {
            path: "t.png".into(),
            side: 1,
            required: 2,
        }));
    }
}
