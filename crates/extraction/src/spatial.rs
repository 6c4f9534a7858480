//! Label-to-value matching over table cells.
//!
//! A value is taken from the nearest cell to the right of a label cell on
//! the same visual row. Multi-column and right-to-left label layouts are
//! not disambiguated.

use crate::patterns::{is_excluded, FieldRule};
use crate::text::clean_value;
use landrec_common::{CellData, CellId, TableStructure};

/// Maximum top-edge difference for two cells to share a row, in pixels
pub const ROW_TOLERANCE_PX: u32 = 10;

fn is_label_cell(cell: &CellData, rule: &FieldRule) -> bool {
    let Some(text) = cell.text_trimmed() else {
        return false;
    };
    let lowered = text.to_lowercase();
    rule.cell_labels.iter().any(|label| {
        lowered
            .match_indices(label)
            .any(|(start, _)| !is_excluded(&lowered, start, rule.excluded_prefixes))
    })
}

/// Value cell for `rule`, if a label cell and a value to its right exist
pub(crate) fn find_value(
    table: &TableStructure,
    rule: &FieldRule,
    tolerance: u32,
) -> Option<(CellId, String)> {
    for label in table.cells().filter(|c| is_label_cell(c, rule)) {
        let nearest = table
            .cells()
            .filter(|c| {
                c.id != label.id
                    && c.bbox.x > label.bbox.x
                    && c.bbox.y.abs_diff(label.bbox.y) <= tolerance
            })
            .filter_map(|c| {
                c.text_trimmed()
                    .and_then(clean_value)
                    .map(|value| (c.bbox.x, c.id, value))
            })
            .min_by_key(|(x, _, _)| *x);

        if let Some((_, id, value)) = nearest {
            return Some((id, value));
        }
    }
    None
}
