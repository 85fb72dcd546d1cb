//! Normalization of arbitrary single-band rasters to 0/1
//!
//! Feature layers often arrive as class codes, counts or float weights.
//! Binarizing them first makes the distance classification unambiguous:
//! every valid positive cell becomes `1`, everything else `0`.

use crate::distance::{ProgressObserver, Stage};
use distmap_core::io::{BlockReader, BlockWriter};
use distmap_core::{Error, RasterElement, Result};
use distmap_tiling::TileIterator;
use ndarray::{Array2, ArrayView2};
use tracing::info;

/// `1` where the sample is valid and greater than zero, `0` elsewhere.
///
/// Unlike distance classification, any NoData value is honored here,
/// including `0` and `1`. NaN samples are never positive.
pub fn binarize_block<T: RasterElement>(block: ArrayView2<'_, T>, nodata: Option<T>) -> Array2<u8> {
    block.mapv(|v| {
        let valid = nodata.map_or(true, |nd| !v.same_as(nd));
        u8::from(valid && v > T::zero())
    })
}

/// Binarize `reader` into `writer` one native block at a time.
///
/// Returns the number of blocks written.
pub fn binarize<T, R, W, P>(reader: &mut R, writer: &mut W, progress: &mut P) -> Result<usize>
where
    T: RasterElement,
    R: BlockReader<T> + ?Sized,
    W: BlockWriter<u8> + ?Sized,
    P: ProgressObserver + ?Sized,
{
    let meta = reader.meta();
    if meta.rows == 0 || meta.cols == 0 {
        return Err(Error::EmptyRaster {
            rows: meta.rows,
            cols: meta.cols,
        });
    }
    let (rows, cols) = writer.shape();
    if (rows, cols) != meta.shape() {
        return Err(Error::SizeMismatch {
            er: meta.rows,
            ec: meta.cols,
            ar: rows,
            ac: cols,
        });
    }
    let nodata = meta.nodata;

    let blocks = TileIterator::native_blocks(&*reader);
    info!("binarizing {}x{} cells in {} blocks", rows, cols, blocks.len());
    progress.begin(Stage::Binarize, blocks.len());
    let mut written = 0;
    for block in blocks {
        let data = reader.read_window(&block)?;
        let out = binarize_block(data.view(), nodata);
        writer.write_window(&block, out.view())?;
        written += 1;
        progress.advance(Stage::Binarize, 1);
    }
    progress.finish(Stage::Binarize);
    Ok(written)
}
