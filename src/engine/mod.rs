//! Layout and chart engines used by the section renderers.
//!
//! | Module     | Role |
//! |------------|------|
//! | `keys`     | crop identity canonicalisation and matching |
//! | `bins`     | heatmap colour bins |
//! | `geometry` | donut slice paths |
//! | `table`    | fixed-column tables with badges and page-break headers |
//! | `flow`     | display list, cursor, page breaks, stamp pass |
//! | `raster`   | sequential chart capture from a render surface |
//! | `canvas`   | the built-in off-screen render surface |

pub mod bins;
pub mod canvas;
pub mod flow;
pub mod geometry;
pub mod keys;
pub mod raster;
pub mod table;
