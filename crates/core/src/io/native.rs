//! GeoTIFF block reading/writing using the `tiff` crate
//!
//! The reader decodes native chunks (strips or tiles) on demand and keeps a
//! small LRU of decoded chunks, so padded windows that straddle the same
//! strips do not decode them twice. The writer accepts windows in any order
//! into a scratch grid and streams strips to the file in `finish`.

use super::{BlockReader, BlockWriter, RasterMeta};
use crate::crs::{CrsKind, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement, Region};
use crate::scratch::{ScratchElement, ScratchGrid, ScratchSpace};
use lru::LruCache;
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray8};
use tiff::encoder::compression::{Deflate, DeflateLevel};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

const SAMPLE_FORMAT_IEEE_FLOAT: u32 = 3;

/// Decoded chunks kept per reader
const DEFAULT_CHUNK_CACHE: usize = 64;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Windowed reader for single-band GeoTIFF files
pub struct GeoTiffReader<T: RasterElement> {
    decoder: Decoder<BufReader<File>>,
    meta: RasterMeta<T>,
    chunk_rows: usize,
    chunk_cols: usize,
    chunks_across: usize,
    cache: LruCache<u32, Array2<T>>,
}

impl<T: RasterElement> GeoTiffReader<T> {
    /// Open a GeoTIFF and read its georeferencing tags
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let bits = match decoder.colortype()? {
            ColorType::Gray(bits) => bits,
            other => {
                return Err(Error::UnsupportedDataType(format!(
                    "only single-band rasters are supported, found {:?}",
                    other
                )))
            }
        };
        let sample_format = decoder.get_tag_u32(Tag::SampleFormat).unwrap_or(1);

        let (width, height) = decoder.dimensions()?;
        let rows = height as usize;
        let cols = width as usize;
        if rows == 0 || cols == 0 {
            return Err(Error::EmptyRaster { rows, cols });
        }

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        let chunk_rows = (chunk_h as usize).clamp(1, rows);
        let chunk_cols = (chunk_w as usize).clamp(1, cols);
        let chunks_across = cols.div_ceil(chunk_cols);

        let transform = read_geotransform(&mut decoder).unwrap_or_default();
        let crs = read_crs(&mut decoder);
        let nodata = read_nodata(&mut decoder)
            .map(|nd| native_nodata(nd, bits, sample_format))
            .and_then(num_traits::cast::<f64, T>);

        debug!(
            "opened {} ({}x{}, chunks {}x{})",
            path.as_ref().display(),
            rows,
            cols,
            chunk_rows,
            chunk_cols
        );

        Ok(Self {
            decoder,
            meta: RasterMeta {
                rows,
                cols,
                transform,
                crs,
                nodata,
            },
            chunk_rows,
            chunk_cols,
            chunks_across,
            cache: LruCache::new(NonZeroUsize::new(DEFAULT_CHUNK_CACHE).unwrap_or(NonZeroUsize::MIN)),
        })
    }

    /// Change how many decoded chunks are kept in memory
    pub fn with_cache_capacity(mut self, chunks: usize) -> Self {
        self.cache.resize(NonZeroUsize::new(chunks).unwrap_or(NonZeroUsize::MIN));
        self
    }

    /// Number of decoded chunks the cache holds
    pub fn cache_capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// Chunks a window of `rows x cols` can touch at any alignment
    fn chunks_spanned(&self, rows: usize, cols: usize) -> usize {
        let down = rows.min(self.meta.rows).div_ceil(self.chunk_rows) + 1;
        let across = (cols.min(self.meta.cols).div_ceil(self.chunk_cols) + 1).min(self.chunks_across);
        down * across
    }

    fn decode_chunk(&mut self, index: u32) -> Result<Array2<T>> {
        let (data_w, data_h) = self.decoder.chunk_data_dimensions(index);
        let samples = cast_samples::<T>(self.decoder.read_chunk(index)?)?;

        // Edge tiles may come back padded to the full chunk size
        let (h, w) = if samples.len() == (data_w * data_h) as usize {
            (data_h as usize, data_w as usize)
        } else if samples.len() == self.chunk_rows * self.chunk_cols {
            (self.chunk_rows, self.chunk_cols)
        } else {
            return Err(Error::Tiff(format!(
                "chunk {} has {} samples, expected {}x{}",
                index,
                samples.len(),
                data_h,
                data_w
            )));
        };

        Array2::from_shape_vec((h, w), samples).map_err(|e| Error::Other(e.to_string()))
    }
}

impl<T: RasterElement> BlockReader<T> for GeoTiffReader<T> {
    fn meta(&self) -> &RasterMeta<T> {
        &self.meta
    }

    fn block_shape(&self) -> (usize, usize) {
        (self.chunk_rows, self.chunk_cols)
    }

    fn reserve_window(&mut self, rows: usize, cols: usize) {
        let needed = self.chunks_spanned(rows, cols);
        if needed > self.cache_capacity() {
            debug!("chunk cache grown to {} chunks for {}x{} windows", needed, rows, cols);
            self.cache.resize(NonZeroUsize::new(needed).unwrap_or(NonZeroUsize::MIN));
        }
    }

    fn read_window(&mut self, region: &Region) -> Result<Array2<T>> {
        region.check_within(self.meta.rows, self.meta.cols)?;
        let mut out = Array2::from_elem(region.shape(), T::zero());
        if region.is_empty() {
            return Ok(out);
        }

        let first_row = region.row_off / self.chunk_rows;
        let last_row = (region.row_end() - 1) / self.chunk_rows;
        let first_col = region.col_off / self.chunk_cols;
        let last_col = (region.col_end() - 1) / self.chunk_cols;

        for cr in first_row..=last_row {
            for cc in first_col..=last_col {
                let index = (cr * self.chunks_across + cc) as u32;
                let chunk = match self.cache.pop(&index) {
                    Some(chunk) => chunk,
                    None => self.decode_chunk(index)?,
                };

                let (h, w) = chunk.dim();
                let chunk_region = Region::new(cr * self.chunk_rows, cc * self.chunk_cols, h, w);
                if let Some(overlap) = chunk_region.intersection(region) {
                    region
                        .relative(&overlap)
                        .slice_mut(out.view_mut())
                        .assign(&chunk_region.relative(&overlap).slice(chunk.view()));
                }
                self.cache.put(index, chunk);
            }
        }

        Ok(out)
    }
}

macro_rules! cast_buffer {
    ($buf:expr) => {
        $buf.iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect()
    };
}

/// Convert any decoded sample buffer to `T`
fn cast_samples<T: RasterElement>(result: DecodingResult) -> Result<Vec<T>> {
    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_buffer!(buf),
        DecodingResult::U16(buf) => cast_buffer!(buf),
        DecodingResult::U32(buf) => cast_buffer!(buf),
        DecodingResult::U64(buf) => cast_buffer!(buf),
        DecodingResult::I8(buf) => cast_buffer!(buf),
        DecodingResult::I16(buf) => cast_buffer!(buf),
        DecodingResult::I32(buf) => cast_buffer!(buf),
        DecodingResult::I64(buf) => cast_buffer!(buf),
        DecodingResult::F32(buf) => cast_buffer!(buf),
        DecodingResult::F64(buf) => cast_buffer!(buf),
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };
    Ok(data)
}

/// Read GeoTransform from ModelPixelScale + ModelTiepoint, or ModelTransformation
fn read_geotransform<R: std::io::Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    // Row-major 4x4 matrix
    let t = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)).ok()?;
    if t.len() < 16 {
        return None;
    }
    Some(GeoTransform {
        origin_x: t[3],
        origin_y: t[7],
        pixel_width: t[0],
        pixel_height: t[5],
        row_rotation: t[1],
        col_rotation: t[4],
    })
}

/// Read the CRS family and EPSG code from the GeoKeyDirectory
fn read_crs<R: std::io::Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    if keys.len() < 4 {
        return None;
    }

    let mut kind = CrsKind::Unknown;
    let mut projected = None;
    let mut geographic = None;

    // [version, revision, minor, count, (key, location, count, value)...]
    for entry in keys[4..].chunks_exact(4).take(keys[3] as usize) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key {
            GT_MODEL_TYPE_KEY => {
                kind = match value {
                    1 => CrsKind::Projected,
                    2 => CrsKind::Geographic,
                    _ => CrsKind::Unknown,
                }
            }
            PROJECTED_CS_TYPE_KEY if value > 0 && value != USER_DEFINED => projected = Some(value),
            GEOGRAPHIC_TYPE_KEY if value > 0 && value != USER_DEFINED => geographic = Some(value),
            _ => {}
        }
    }

    match (projected, geographic, kind) {
        (Some(code), _, _) => Some(CRS::projected(code as u32)),
        (None, Some(code), CrsKind::Projected) => Some(CRS::from_epsg(code as u32).with_kind(CrsKind::Projected)),
        (None, Some(code), _) => Some(CRS::geographic(code as u32)),
        (None, None, CrsKind::Unknown) => None,
        (None, None, kind) => Some(CRS::unnamed(kind)),
    }
}

/// NoData as the file's own sample type holds it.
///
/// GDAL_NODATA is decimal text; `-9999.9` on a float32 band means the
/// float32 nearest to it, which differs from the parsed f64.
fn native_nodata(value: f64, bits: u8, sample_format: u32) -> f64 {
    match (sample_format, bits) {
        (SAMPLE_FORMAT_IEEE_FLOAT, 32) => value as f32 as f64,
        _ => value,
    }
}

/// Read the GDAL_NODATA ASCII tag
fn read_nodata<R: std::io::Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    let text = text.trim_end_matches('\0').trim();
    if text.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    text.parse::<f64>().ok()
}

/// Sample types the GeoTIFF writer can encode
pub trait TiffSample: RasterElement + ScratchElement {
    /// Stream `grid` as strips of `rows_per_strip` rows
    fn encode_strips<W: Write + Seek>(
        writer: W,
        grid: &mut ScratchGrid<Self>,
        meta: &RasterMeta<Self>,
        rows_per_strip: usize,
    ) -> Result<()>;
}

macro_rules! impl_tiff_sample {
    ($t:ty, $color:ty) => {
        impl TiffSample for $t {
            fn encode_strips<W: Write + Seek>(
                writer: W,
                grid: &mut ScratchGrid<Self>,
                meta: &RasterMeta<Self>,
                rows_per_strip: usize,
            ) -> Result<()> {
                let (rows, cols) = grid.shape();
                let mut encoder = TiffEncoder::new(writer)?;
                let mut image = encoder.new_image_with_compression::<$color, _>(
                    cols as u32,
                    rows as u32,
                    Deflate::with_level(DeflateLevel::Balanced),
                )?;
                image.rows_per_strip(rows_per_strip as u32)?;
                write_geo_tags(image.encoder(), meta)?;

                let mut row = 0;
                while row < rows {
                    let n = rows_per_strip.min(rows - row);
                    let strip = grid.read_window(&Region::new(row, 0, n, cols))?;
                    let samples: Vec<$t> = strip.iter().copied().collect();
                    image.write_strip(&samples)?;
                    row += n;
                }
                image.finish()?;
                Ok(())
            }
        }
    };
}

impl_tiff_sample!(f32, Gray32Float);
impl_tiff_sample!(u8, Gray8);

fn write_geo_tags<W, K, T>(dir: &mut DirectoryEncoder<'_, W, K>, meta: &RasterMeta<T>) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
    T: RasterElement,
{
    let gt = meta.transform;
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;

    let geokeys = geo_key_directory(meta.crs.as_ref());
    dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;

    if let Some(nodata) = meta.nodata {
        let text = if nodata.is_nan_value() {
            "nan".to_string()
        } else {
            nodata.to_f64().map(|v| v.to_string()).unwrap_or_default()
        };
        dir.write_tag(tag(GDAL_NODATA), text.as_str())?;
    }
    Ok(())
}

/// Minimal GeoKeyDirectory so GIS tools recognize the georeferencing
fn geo_key_directory(crs: Option<&CRS>) -> Vec<u16> {
    let mut keys: Vec<[u16; 4]> = Vec::new();
    let kind = crs.map(CRS::kind).unwrap_or(CrsKind::Unknown);
    match kind {
        CrsKind::Projected => keys.push([GT_MODEL_TYPE_KEY, 0, 1, 1]),
        CrsKind::Geographic => keys.push([GT_MODEL_TYPE_KEY, 0, 1, 2]),
        CrsKind::Unknown => {}
    }
    // RasterPixelIsArea
    keys.push([GT_RASTER_TYPE_KEY, 0, 1, 1]);
    if let Some(code) = crs.and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok()) {
        match kind {
            CrsKind::Projected => keys.push([PROJECTED_CS_TYPE_KEY, 0, 1, code]),
            CrsKind::Geographic => keys.push([GEOGRAPHIC_TYPE_KEY, 0, 1, code]),
            CrsKind::Unknown => {}
        }
    }
    keys.sort_by_key(|k| k[0]);

    let mut out = vec![1, 1, 0, keys.len() as u16];
    out.extend(keys.into_iter().flatten());
    out
}

/// GeoTIFF writer that accepts windows in any order.
///
/// Windows land in a disk-backed scratch grid; nothing is written to
/// `path` until [`GeoTiffWriter::finish`]. Strips are Deflate-compressed.
/// A writer dropped without `finish`, or whose `finish` fails, leaves no
/// output file behind.
pub struct GeoTiffWriter<T: TiffSample> {
    path: PathBuf,
    meta: RasterMeta<T>,
    rows_per_strip: usize,
    grid: ScratchGrid<T>,
    space: ScratchSpace,
}

impl<T: TiffSample> GeoTiffWriter<T> {
    /// Prepare a writer for `meta`'s shape and georeferencing.
    ///
    /// Scratch storage goes to `scratch_dir`, or the system temp dir.
    pub fn create<P: AsRef<Path>>(path: P, meta: RasterMeta<T>, scratch_dir: Option<&Path>) -> Result<Self> {
        let space = ScratchSpace::new(scratch_dir)?;
        let grid = space.allocate::<T>("output.bin", meta.rows, meta.cols)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            meta,
            rows_per_strip: 16,
            grid,
            space,
        })
    }

    /// Rows per TIFF strip in the output file
    pub fn with_rows_per_strip(mut self, rows: usize) -> Self {
        self.rows_per_strip = rows.max(1);
        self
    }

    /// Encode the collected grid to `path` and release scratch storage
    pub fn finish(self) -> Result<()> {
        let Self {
            path,
            meta,
            rows_per_strip,
            mut grid,
            space,
        } = self;

        grid.flush()?;
        let file = File::create(&path)?;
        remove_on_error(&path, encode_file(file, &mut grid, &meta, rows_per_strip))?;
        debug!("wrote {} ({}x{})", path.display(), meta.rows, meta.cols);

        drop(grid);
        space.close()
    }
}

fn encode_file<T: TiffSample>(
    file: File,
    grid: &mut ScratchGrid<T>,
    meta: &RasterMeta<T>,
    rows_per_strip: usize,
) -> Result<()> {
    let mut writer = BufWriter::new(file);
    T::encode_strips(&mut writer, grid, meta, rows_per_strip)?;
    writer.flush()?;
    Ok(())
}

/// Delete a partially written file when encoding failed
fn remove_on_error<V>(path: &Path, result: Result<V>) -> Result<V> {
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(path) {
            debug!("could not remove incomplete {}: {}", path.display(), e);
        }
    }
    result
}

impl<T: TiffSample> BlockWriter<T> for GeoTiffWriter<T> {
    fn shape(&self) -> (usize, usize) {
        self.meta.shape()
    }

    fn write_window(&mut self, region: &Region, data: ArrayView2<'_, T>) -> Result<()> {
        self.grid.write_window(region, data)
    }
}
