//! Distance map runs over block readers and writers

use super::assemble::{mask_invalid, stream_output, to_output};
use super::edt::{column_pass, euclidean_distance, row_pass};
use super::mask::classify;
use super::progress::{NoProgress, ProgressObserver, RunState, Stage};
use distmap_core::io::{BlockReader, BlockWriter, MemoryReader, MemoryWriter, RasterMeta};
use distmap_core::scratch::ScratchSpace;
use distmap_core::{Algorithm, Error, PixelSpacing, Raster, RasterElement, Result};
use distmap_tiling::{ExecutionStrategy, TileIterator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, trace, warn};

/// Parameters for a distance map run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceParams {
    /// Tile edge in pixels; `0` computes over the whole grid
    pub tile_size: usize,
    /// Margin read around each tile in pixels (tiled runs only)
    pub tile_padding: usize,
    /// Columns (column pass) or rows (row pass) transformed per strip in
    /// whole-grid runs
    pub strip_size: usize,
    /// Parent directory for scratch files; system temp dir when `None`
    pub scratch_dir: Option<PathBuf>,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            tile_size: 0,
            tile_padding: 512,
            strip_size: 256,
            scratch_dir: None,
        }
    }
}

impl DistanceParams {
    pub fn validate(&self) -> Result<()> {
        if self.strip_size == 0 {
            return Err(Error::InvalidParameter {
                name: "strip_size",
                value: self.strip_size.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::select(self.tile_size, self.tile_padding)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub strategy: ExecutionStrategy,
    /// `read_window` calls made on the source
    pub windows_read: usize,
    /// `write_window` calls made on the output
    pub windows_written: usize,
    /// Cells that are not NoData
    pub valid_cells: u64,
    /// Feature cells; `0` means every valid cell is `+inf`
    pub feature_cells: u64,
}

impl RunSummary {
    fn new(strategy: ExecutionStrategy) -> Self {
        Self {
            strategy,
            windows_read: 0,
            windows_written: 0,
            valid_cells: 0,
            feature_cells: 0,
        }
    }
}

struct Run<'a, P: ProgressObserver + ?Sized> {
    state: RunState,
    summary: RunSummary,
    progress: &'a mut P,
}

impl<'a, P: ProgressObserver + ?Sized> Run<'a, P> {
    fn transition(&mut self, next: RunState) {
        if self.summary.strategy.is_tiled() {
            trace!("{} -> {}", self.state, next);
        } else {
            debug!("{} -> {}", self.state, next);
        }
        self.state = next;
        self.progress.state_changed(next);
    }
}

/// Compute the distance map of `reader` into `writer`.
///
/// Cells equal to `1` are features; every valid cell receives the
/// Euclidean distance to the nearest feature in the units of the source
/// geotransform, NoData cells receive NaN. With `tile_size > 0` each tile
/// sees only features within `tile_padding` pixels of it, see
/// [`distmap_tiling::pad`].
///
/// # Errors
/// Fails on empty input, invalid pixel spacing or parameters, an output
/// of a different shape, and any I/O failure. After a failure the output
/// must be considered incomplete.
pub fn distance_map<T, R, W, P>(
    reader: &mut R,
    writer: &mut W,
    params: &DistanceParams,
    progress: &mut P,
) -> Result<RunSummary>
where
    T: RasterElement,
    R: BlockReader<T> + ?Sized,
    W: BlockWriter<f32> + ?Sized,
    P: ProgressObserver + ?Sized,
{
    let strategy = params.strategy();
    let mut run = Run {
        state: RunState::Idle,
        summary: RunSummary::new(strategy),
        progress,
    };

    let result = check_inputs(reader.meta(), writer.shape(), params).and_then(|spacing| {
        info!("distance map: {}x{} cells, {}", reader.meta().rows, reader.meta().cols, strategy);
        match strategy {
            ExecutionStrategy::WholeGrid => whole_grid(&mut run, reader, writer, params, spacing),
            ExecutionStrategy::Tiled { tile_size, padding } => {
                tiled(&mut run, reader, writer, tile_size, padding, spacing)
            }
        }
    });

    match result {
        Ok(()) => {
            if run.summary.feature_cells == 0 {
                warn!("no feature cells in source; every valid cell is +inf");
            }
            run.transition(RunState::Done);
            Ok(run.summary)
        }
        Err(e) => {
            error!("distance map failed while {}: {}", run.state, e);
            run.transition(RunState::Failed);
            Err(e)
        }
    }
}

fn check_inputs<T: RasterElement>(
    meta: &RasterMeta<T>,
    output_shape: (usize, usize),
    params: &DistanceParams,
) -> Result<PixelSpacing> {
    if meta.rows == 0 || meta.cols == 0 {
        return Err(Error::EmptyRaster {
            rows: meta.rows,
            cols: meta.cols,
        });
    }
    params.validate()?;

    let spacing = meta.pixel_spacing();
    spacing.validate()?;

    if output_shape != meta.shape() {
        return Err(Error::SizeMismatch {
            er: meta.rows,
            ec: meta.cols,
            ar: output_shape.0,
            ac: output_shape.1,
        });
    }

    match &meta.crs {
        Some(crs) if crs.is_projected() => {}
        Some(crs) => warn!(
            "CRS {} is not projected; distances are in its native units ({} x {})",
            crs.identifier(),
            spacing.dx,
            spacing.dy
        ),
        None => warn!("source has no CRS; distances are in geotransform units"),
    }

    if let ExecutionStrategy::Tiled { tile_size, padding } = params.strategy() {
        warn!(
            "tiled run ({}px tiles): distances to features farther than {}px outside a tile are over-estimated",
            tile_size, padding
        );
    }

    Ok(spacing)
}

fn whole_grid<T, R, W, P>(
    run: &mut Run<'_, P>,
    reader: &mut R,
    writer: &mut W,
    params: &DistanceParams,
    spacing: PixelSpacing,
) -> Result<()>
where
    T: RasterElement,
    R: BlockReader<T> + ?Sized,
    W: BlockWriter<f32> + ?Sized,
    P: ProgressObserver + ?Sized,
{
    let (rows, cols) = reader.meta().shape();
    let nodata = reader.meta().nodata;

    // Removed on drop, including every early return below
    let space = ScratchSpace::new(params.scratch_dir.as_deref())?;
    let mut binary = space.allocate::<u8>("binary.u8", rows, cols)?;
    let mut validity = space.allocate::<bool>("validity.bool", rows, cols)?;

    run.transition(RunState::ClassifyingSource);
    let blocks = TileIterator::native_blocks(&*reader);
    run.progress.begin(Stage::Classify, blocks.len());
    for block in blocks.clone() {
        let data = reader.read_window(&block)?;
        run.summary.windows_read += 1;
        let masked = classify(data.view(), nodata);
        run.summary.feature_cells += masked.feature_count();
        run.summary.valid_cells += masked.valid_count();
        binary.write_window(&block, masked.binary.view())?;
        validity.write_window(&block, masked.validity.view())?;
        run.progress.advance(Stage::Classify, 1);
    }
    run.progress.finish(Stage::Classify);

    run.transition(RunState::ComputingDistance);
    let mut distance = space.allocate::<f64>("distance.f64", rows, cols)?;
    let strip = params.strip_size;
    let column_strips = TileIterator::rectangular(rows, cols, rows, strip);
    let row_strips = TileIterator::rectangular(rows, cols, strip, cols);
    run.progress.begin(Stage::Transform, column_strips.len() + row_strips.len());

    for region in column_strips {
        let b = binary.read_window(&region)?;
        let squared = column_pass(b.view(), spacing.dy)?;
        distance.write_window(&region, squared.view())?;
        run.progress.advance(Stage::Transform, 1);
    }
    drop(binary);

    for region in row_strips {
        let squared = distance.read_window(&region)?;
        let d = row_pass(squared.view(), spacing.dx)?;
        distance.write_window(&region, d.view())?;
        run.progress.advance(Stage::Transform, 1);
    }
    distance.flush()?;
    run.progress.finish(Stage::Transform);

    run.transition(RunState::WritingOutput);
    run.summary.windows_written +=
        stream_output(&mut distance, &mut validity, blocks, writer, &mut *run.progress)?;

    drop(distance);
    drop(validity);
    space.close()
}

fn tiled<T, R, W, P>(
    run: &mut Run<'_, P>,
    reader: &mut R,
    writer: &mut W,
    tile_size: usize,
    padding: usize,
    spacing: PixelSpacing,
) -> Result<()>
where
    T: RasterElement,
    R: BlockReader<T> + ?Sized,
    W: BlockWriter<f32> + ?Sized,
    P: ProgressObserver + ?Sized,
{
    let (rows, cols) = reader.meta().shape();
    let nodata = reader.meta().nodata;

    let window = tile_size.saturating_add(padding.saturating_mul(2));
    reader.reserve_window(window, window);

    let tiles = TileIterator::new(rows, cols, tile_size).padded(padding);
    run.progress.begin(Stage::Tiles, tiles.len());
    for padded in tiles {
        run.transition(RunState::ClassifyingSource);
        let data = reader.read_window(&padded.read)?;
        run.summary.windows_read += 1;
        let masked = classify(data.view(), nodata);

        let crop = padded.crop_region();
        run.summary.feature_cells +=
            crop.slice(masked.binary.view()).iter().filter(|&&b| b == 0).count() as u64;
        run.summary.valid_cells += crop.slice(masked.validity.view()).iter().filter(|&&v| v).count() as u64;

        run.transition(RunState::ComputingDistance);
        let mut distance = euclidean_distance(masked.binary.view(), spacing)?;
        mask_invalid(&mut distance, masked.validity.view());

        run.transition(RunState::WritingOutput);
        let out = to_output(crop.slice(distance.view()));
        writer.write_window(&padded.tile, out.view())?;
        run.summary.windows_written += 1;
        run.progress.advance(Stage::Tiles, 1);
    }
    run.progress.finish(Stage::Tiles);
    Ok(())
}

/// Distance map of an in-memory raster.
///
/// Output carries the source georeferencing and NaN as NoData.
pub fn distance_raster<T: RasterElement>(raster: &Raster<T>, params: &DistanceParams) -> Result<Raster<f32>> {
    let mut reader = MemoryReader::new(raster.clone());
    let mut writer = MemoryWriter::<f32>::new(reader.meta());
    distance_map(&mut reader, &mut writer, params, &mut NoProgress)?;

    let mut output = writer.into_raster();
    output.set_nodata(Some(f32::NAN));
    Ok(output)
}

/// Euclidean distance to feature cells
#[derive(Debug, Clone, Default)]
pub struct EuclideanDistance;

impl Algorithm for EuclideanDistance {
    type Input = Raster<f64>;
    type Output = Raster<f32>;
    type Params = DistanceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "EuclideanDistance"
    }

    fn description(&self) -> &'static str {
        "Euclidean distance from every valid cell to the nearest feature cell"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        distance_raster(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use distmap_core::{GeoTransform, CRS};
    use ndarray::Array2;

    fn feature_raster(rows: usize, cols: usize, features: &[(usize, usize)]) -> Raster<u8> {
        let mut data = Array2::zeros((rows, cols));
        for &(r, c) in features {
            data[[r, c]] = 1;
        }
        let mut raster = Raster::from_array(data);
        raster.set_crs(Some(CRS::projected(32719)));
        raster
    }

    #[derive(Default)]
    struct Recorder {
        states: Vec<RunState>,
        advanced: usize,
    }

    impl ProgressObserver for Recorder {
        fn advance(&mut self, _stage: Stage, steps: usize) {
            self.advanced += steps;
        }

        fn state_changed(&mut self, state: RunState) {
            self.states.push(state);
        }
    }

    #[test]
    fn test_default_params() {
        let params = DistanceParams::default();
        assert_eq!(params.tile_size, 0);
        assert_eq!(params.tile_padding, 512);
        assert_eq!(params.strategy(), ExecutionStrategy::WholeGrid);
        assert!(params.validate().is_ok());

        let bad = DistanceParams {
            strip_size: 0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameter { name: "strip_size", .. })));
    }

    #[test]
    fn test_whole_grid_corner() {
        let raster = feature_raster(4, 4, &[(0, 0)]);
        let params = DistanceParams {
            strip_size: 3,
            ..Default::default()
        };
        let out = distance_raster(&raster, &params).unwrap();

        assert_eq!(out.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(out.get(0, 1).unwrap(), 1.0);
        assert_relative_eq!(out.get(3, 3).unwrap(), 18.0f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_anisotropic_geotransform() {
        let mut raster = feature_raster(5, 5, &[(0, 0)]);
        raster.set_transform(GeoTransform::new(0.0, 0.0, 2.0, -1.0));
        let out = distance_raster(&raster, &DistanceParams::default()).unwrap();

        assert_relative_eq!(out.get(0, 2).unwrap(), 4.0);
        assert_relative_eq!(out.get(2, 0).unwrap(), 2.0);
    }

    #[test]
    fn test_whole_grid_states_and_summary() {
        let raster = feature_raster(6, 5, &[(2, 2)]);
        let mut reader = MemoryReader::new(raster).with_block_shape(4, 3);
        let mut writer = MemoryWriter::<f32>::new(reader.meta());
        let mut recorder = Recorder::default();
        let params = DistanceParams {
            strip_size: 2,
            ..Default::default()
        };

        let summary = distance_map(&mut reader, &mut writer, &params, &mut recorder).unwrap();

        assert_eq!(
            recorder.states,
            vec![
                RunState::ClassifyingSource,
                RunState::ComputingDistance,
                RunState::WritingOutput,
                RunState::Done
            ]
        );
        assert_eq!(summary.windows_read, 4);
        assert_eq!(summary.windows_written, 4);
        assert_eq!(writer.windows_written(), 4);
        assert_eq!(summary.feature_cells, 1);
        assert_eq!(summary.valid_cells, 30);
        // 4 classify + (3 column + 3 row strips) + 4 write
        assert_eq!(recorder.advanced, 14);
    }

    #[test]
    fn test_tiled_matches_whole_grid_within_padding() {
        let raster = feature_raster(10, 12, &[(1, 1), (8, 10)]);
        let whole = distance_raster(&raster, &DistanceParams::default()).unwrap();
        let params = DistanceParams {
            tile_size: 4,
            tile_padding: 16,
            ..Default::default()
        };
        let tiled = distance_raster(&raster, &params).unwrap();

        for (a, b) in whole.data().iter().zip(tiled.data().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_tiled_without_padding_over_estimates() {
        let raster = feature_raster(1, 8, &[(0, 0)]);
        let params = DistanceParams {
            tile_size: 4,
            tile_padding: 0,
            ..Default::default()
        };
        let out = distance_raster(&raster, &params).unwrap();

        assert_relative_eq!(out.get(0, 3).unwrap(), 3.0);
        // Second tile sees no feature
        assert!(out.get(0, 5).unwrap().is_infinite());
    }

    #[test]
    fn test_tiled_states_repeat_per_tile() {
        let raster = feature_raster(4, 4, &[(0, 0)]);
        let mut reader = MemoryReader::new(raster);
        let mut writer = MemoryWriter::<f32>::new(reader.meta());
        let mut recorder = Recorder::default();
        let params = DistanceParams {
            tile_size: 2,
            tile_padding: 1,
            ..Default::default()
        };

        let summary = distance_map(&mut reader, &mut writer, &params, &mut recorder).unwrap();

        assert_eq!(summary.windows_written, 4);
        assert_eq!(summary.feature_cells, 1);
        assert_eq!(summary.valid_cells, 16);
        assert_eq!(recorder.states.len(), 4 * 3 + 1);
        assert_eq!(recorder.states.last(), Some(&RunState::Done));
    }

    /// Memory reader that records window hints
    struct HintedReader {
        inner: MemoryReader<u8>,
        hints: Vec<(usize, usize)>,
    }

    impl BlockReader<u8> for HintedReader {
        fn meta(&self) -> &RasterMeta<u8> {
            self.inner.meta()
        }

        fn block_shape(&self) -> (usize, usize) {
            self.inner.block_shape()
        }

        fn read_window(&mut self, region: &distmap_core::Region) -> Result<Array2<u8>> {
            self.inner.read_window(region)
        }

        fn reserve_window(&mut self, rows: usize, cols: usize) {
            self.hints.push((rows, cols));
        }
    }

    #[test]
    fn test_tiled_reserves_padded_window() {
        let mut reader = HintedReader {
            inner: MemoryReader::new(feature_raster(10, 10, &[(5, 5)])),
            hints: Vec::new(),
        };
        let mut writer = MemoryWriter::<f32>::new(reader.meta());
        let params = DistanceParams {
            tile_size: 4,
            tile_padding: 3,
            ..Default::default()
        };
        distance_map(&mut reader, &mut writer, &params, &mut NoProgress).unwrap();
        assert_eq!(reader.hints, vec![(10, 10)]);

        // Whole-grid runs read each block once and give no hint
        reader.hints.clear();
        distance_map(&mut reader, &mut writer, &DistanceParams::default(), &mut NoProgress).unwrap();
        assert!(reader.hints.is_empty());
    }

    #[test]
    fn test_nodata_becomes_nan() {
        let mut data = Array2::from_elem((3, 3), 0i32);
        data[[0, 0]] = 1;
        data[[1, 1]] = -1;
        let mut raster = Raster::from_array(data);
        raster.set_nodata(Some(-1));

        for tile_size in [0, 2] {
            let params = DistanceParams {
                tile_size,
                tile_padding: 4,
                ..Default::default()
            };
            let out = distance_raster(&raster, &params).unwrap();
            assert!(out.get(1, 1).unwrap().is_nan());
            assert_relative_eq!(out.get(2, 2).unwrap(), 8.0f32.sqrt(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_nodata_one_keeps_everything() {
        let raster = {
            let mut r = feature_raster(3, 3, &[(1, 1)]);
            r.set_nodata(Some(1));
            r
        };
        let out = distance_raster(&raster, &DistanceParams::default()).unwrap();
        assert!(out.data().iter().all(|v| !v.is_nan()));
        assert_eq!(out.get(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_no_features_is_infinite() {
        let raster = feature_raster(3, 4, &[]);
        let mut reader = MemoryReader::new(raster);
        let mut writer = MemoryWriter::<f32>::new(reader.meta());
        let summary =
            distance_map(&mut reader, &mut writer, &DistanceParams::default(), &mut NoProgress).unwrap();

        assert_eq!(summary.feature_cells, 0);
        let out = writer.into_raster();
        assert!(out.data().iter().all(|v| *v == f32::INFINITY));
    }

    #[test]
    fn test_empty_raster_fails() {
        let raster = Raster::<u8>::new(0, 5);
        let err = distance_raster(&raster, &DistanceParams::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyRaster { rows: 0, cols: 5 }));
    }

    #[test]
    fn test_bad_spacing_fails_and_reports_failed() {
        let mut raster = feature_raster(2, 2, &[(0, 0)]);
        raster.set_transform(GeoTransform::new(0.0, 0.0, 0.0, -1.0));
        let mut reader = MemoryReader::new(raster);
        let mut writer = MemoryWriter::<f32>::new(reader.meta());
        let mut recorder = Recorder::default();

        let err = distance_map(&mut reader, &mut writer, &DistanceParams::default(), &mut recorder)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert_eq!(recorder.states, vec![RunState::Failed]);
    }

    #[test]
    fn test_output_shape_mismatch() {
        let raster = feature_raster(2, 3, &[(0, 0)]);
        let mut reader = MemoryReader::new(raster);
        let mut writer = MemoryWriter::<f32>::new(&RasterMeta::<f32>::new(3, 2));
        let err = distance_map(&mut reader, &mut writer, &DistanceParams::default(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_algorithm_trait() {
        let mut data = Array2::zeros((3, 3));
        data[[1, 1]] = 1.0;
        let out = EuclideanDistance.execute_default(Raster::from_array(data)).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 2.0f32.sqrt(), epsilon = 1e-6);
        assert!(out.nodata().map_or(false, |v| v.is_nan()));
    }
}
