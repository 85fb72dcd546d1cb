//! Result assembly: invalid cells to NaN, f64 to f32, block-wise output

use super::progress::{ProgressObserver, Stage};
use distmap_core::io::BlockWriter;
use distmap_core::scratch::ScratchGrid;
use distmap_core::{Region, Result};
use distmap_tiling::TileIterator;
use ndarray::{Array2, ArrayView2, Zip};

/// Overwrite every cell whose validity is `false` with NaN
pub fn mask_invalid(distance: &mut Array2<f64>, validity: ArrayView2<'_, bool>) {
    Zip::from(distance).and(&validity).for_each(|d, &valid| {
        if !valid {
            *d = f64::NAN;
        }
    });
}

/// Output encoding of a distance window
pub fn to_output(distance: ArrayView2<'_, f64>) -> Array2<f32> {
    distance.mapv(|d| d as f32)
}

/// Stream the finished distance grid to `writer` one native block at a time.
///
/// Returns the number of windows written.
pub fn stream_output<W, P>(
    distance: &mut ScratchGrid<f64>,
    validity: &mut ScratchGrid<bool>,
    blocks: TileIterator,
    writer: &mut W,
    progress: &mut P,
) -> Result<usize>
where
    W: BlockWriter<f32> + ?Sized,
    P: ProgressObserver + ?Sized,
{
    progress.begin(Stage::Write, blocks.len());
    let mut written = 0;
    for block in blocks {
        write_block(distance, validity, &block, writer)?;
        written += 1;
        progress.advance(Stage::Write, 1);
    }
    progress.finish(Stage::Write);
    Ok(written)
}

fn write_block<W: BlockWriter<f32> + ?Sized>(
    distance: &mut ScratchGrid<f64>,
    validity: &mut ScratchGrid<bool>,
    block: &Region,
    writer: &mut W,
) -> Result<()> {
    let mut values = distance.read_window(block)?;
    let valid = validity.read_window(block)?;
    mask_invalid(&mut values, valid.view());
    writer.write_window(block, to_output(values.view()).view())
}
