//! A read-only geospatial-textual query engine over cell/region map indexes.
//!
//! `geocqr` parses a compact query DSL into an operator tree, evaluates it
//! against a set of read-only collaborator stores (cell/region hierarchy,
//! item index, key/value object store, triangulated arrangement), and
//! produces Cell Query Results (CQRs) and key/value facet statistics. It
//! does not build an index, render results, or run an HTTP/CLI front-end —
//! those live upstream and downstream of this crate.
//!
//! ```rust,ignore
//! use geocqr::config::EngineConfig;
//! use geocqr::query::parse;
//! use geocqr::calculator::{self, EvalContext};
//! use geocqr::cqr::Cqr;
//!
//! // `collaborators` is whatever `Collaborators` bundle the host
//! // application builds over its own cell/region/item-index stores.
//! let config = EngineConfig::default();
//! let ctx = EvalContext::new(&collaborators, &config);
//!
//! let tree = parse("$c:0").unwrap();
//! let result: Cqr = calculator::run(tree.as_ref(), &ctx).unwrap();
//! ```

pub mod calculator;
pub mod collaborators;
pub mod config;
pub mod cqr;
pub mod csq;
pub mod error;
pub mod exclusions;
pub mod item_index;
pub mod koma;
pub mod query;
pub mod resolver;
pub mod stats;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use collaborators::{
    CellTextCompleter, Collaborators, CqrDilator, GeoHierarchy, IndexStore, MatchType,
    RoutingProvider, TriangulationArrangement,
};
pub use config::EngineConfig;
pub use cqr::{Cqr, ResultShape, TreedCqr};
pub use error::{QueryError, Result};
pub use item_index::ItemIndex;
pub use query::{Node, OpKind};

pub use geo::{Point, Polygon, Rect};
pub use geocqr_types::{CellId, Geometry, ItemId, ItemIdFlags, RegionId};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for users of the engine.
pub mod prelude {
    pub use crate::calculator::{self, EvalContext};
    pub use crate::collaborators::{Collaborators, MatchType};
    pub use crate::config::EngineConfig;
    pub use crate::cqr::{Cqr, ResultShape, TreedCqr};
    pub use crate::error::{QueryError, Result};
    pub use crate::query::parse;
    pub use geo::{Point, Polygon, Rect};
    pub use geocqr_types::{CellId, Geometry, ItemId, ItemIdFlags, RegionId};
}
