//! Subject classification and CQR-synthesising set operators (spec.md §4.4):
//! `%N%` cell dilation, region dilation, `BETWEEN`, and `COMPASS`.

pub mod between;
pub mod compass;
pub mod dilation;
pub mod subject;

pub use between::between;
pub use compass::{synthesize_compass, Direction};
pub use dilation::{cell_dilate, dilate_by_cell_coverage, dilate_by_item_coverage};
pub use subject::{classify_subject, QuerySubject};
