//! The operator-tree evaluator (spec.md §4.5): walks a parsed [`Node`] tree
//! and folds it into a result shape `R`, generic over [`ResultShape`] the
//! same way the rest of the csq/resolver machinery is (spec.md §9's
//! "template over result shape").

use geo::{LineString, Point, Polygon, Rect};
use geocqr_types::{CellId, ItemIdFlags};

use crate::collaborators::{Collaborators, MatchType};
use crate::config::EngineConfig;
use crate::cqr::{Cqr, ResultShape};
use crate::csq::compass::Direction;
use crate::csq::{between, cell_dilate, classify_subject, dilate_by_cell_coverage, dilate_by_item_coverage, synthesize_compass};
use crate::error::{QueryError, Result};
use crate::item_index::ItemIndex;
use crate::query::{Node, OpKind};
use crate::resolver::{resolve_point_radius, resolve_polygon, Accuracy};

/// A bbox diagonal above this is assumed large enough that the text index's
/// own rect lookup is cheaper than walking the region DAG (mirrors the
/// resolver's own `AUTO_CELL_BBOX_THRESHOLD_M`, spec.md §4.3).
const RECT_DIRECT_LOOKUP_THRESHOLD_M: f64 = 250_000.0;

/// A `PATH` leaf is resolved by direct text-index lookup only below these
/// bounds (spec.md §4.5); longer or wider corridors fall back to composing
/// consecutive `BETWEEN` segments and dilating them.
const PATH_DIRECT_LOOKUP_LENGTH_M: f64 = 5_000.0;
const PATH_DIRECT_LOOKUP_RADIUS_M: f64 = 5_000.0;

/// The collaborators and configuration an evaluation run is bound to.
pub struct EvalContext<'a> {
    pub collaborators: &'a Collaborators,
    pub config: &'a EngineConfig,
}

impl<'a> EvalContext<'a> {
    pub fn new(collaborators: &'a Collaborators, config: &'a EngineConfig) -> Self {
        Self { collaborators, config }
    }
}

/// Evaluate a parsed query tree, or the empty result for an un-parseable
/// query (spec.md §4.1: the parser never fails, it just shrinks the tree).
pub fn run<R: ResultShape>(tree: Option<&Node>, ctx: &EvalContext) -> Result<R> {
    match tree {
        Some(node) => evaluate(node, ctx),
        None => Ok(R::empty(ItemIdFlags::default())),
    }
}

/// Evaluate a single node, recursing into its children as needed.
pub fn evaluate<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    match node.op {
        OpKind::String => leaf_string(&node.value, ctx),
        OpKind::StringItem => leaf_string_item(&node.value, ctx),
        OpKind::StringRegion => leaf_string_region(&node.value, ctx),
        OpKind::Region => leaf_region(&node.value, ctx),
        OpKind::RegionExclusiveCells => leaf_region_exclusive_cells(&node.value, ctx),
        OpKind::Cell => leaf_cell(&node.value, ctx),
        OpKind::Cells => leaf_cells(&node.value),
        OpKind::Triangle => leaf_triangle(&node.value, ctx),
        OpKind::Triangles => leaf_triangles(&node.value, ctx),
        OpKind::Rect => leaf_rect(&node.value, ctx),
        OpKind::Polygon => leaf_polygon(&node.value, ctx),
        OpKind::Path => leaf_path(&node.value, ctx),
        OpKind::Point => leaf_path(&node.value, ctx),
        OpKind::Item => leaf_item(&node.value, ctx),

        OpKind::FmConversion => unary_fm_conversion(node, ctx),
        OpKind::CellDilation => unary_cell_dilation(node, ctx),
        OpKind::RegionDilationByCellCoverage => unary_region_dilation(node, ctx, dilate_by_cell_coverage),
        OpKind::RegionDilationByItemCoverage => unary_region_dilation(node, ctx, dilate_by_item_coverage),
        OpKind::Compass => unary_compass(node, ctx),
        OpKind::In => unary_in(node, ctx),
        OpKind::Near => unary_near(node, ctx),
        OpKind::RelevantElement => unary_relevant_element(node, ctx),
        OpKind::QueryExclusiveCells => unary_query_exclusive_cells(node, ctx),

        OpKind::SetOp => binary_set_op(node, ctx),
        OpKind::Between => binary_between(node, ctx),
    }
}

fn child_result<R: ResultShape>(node: &Node, index: usize, ctx: &EvalContext) -> Result<R> {
    evaluate(&node.children[index], ctx)
}

/// The lexical hint a leaf's text carries in its own spelling (spec.md
/// §4.5: "derive a match-type hint ... from its structure"): a leading `^`
/// anchors the prefix, a trailing `$` anchors the suffix, both together mean
/// an exact match, and neither is a plain substring search.
fn match_type_and_text(raw: &str) -> (MatchType, &str) {
    let has_prefix = raw.starts_with('^');
    let has_suffix = raw.ends_with('$') && raw.len() > 1;
    let start = if has_prefix { 1 } else { 0 };
    let end = if has_suffix { raw.len() - 1 } else { raw.len() };
    let text = &raw[start..end.max(start)];
    let match_type = match (has_prefix, has_suffix) {
        (true, true) => MatchType::Exact,
        (true, false) => MatchType::Prefix,
        (false, true) => MatchType::Suffix,
        (false, false) => MatchType::Substring,
    };
    (match_type, text)
}

fn leaf_string<R: ResultShape>(raw: &str, ctx: &EvalContext) -> Result<R> {
    let (match_type, text) = match_type_and_text(raw);
    let cqr = ctx.collaborators.text_completer()?.complete(text, match_type);
    Ok(R::of_cqr(cqr))
}

fn leaf_string_item<R: ResultShape>(raw: &str, ctx: &EvalContext) -> Result<R> {
    let (match_type, text) = match_type_and_text(raw);
    let cqr = ctx.collaborators.text_completer()?.items(text, match_type);
    Ok(R::of_cqr(cqr))
}

fn leaf_string_region<R: ResultShape>(raw: &str, ctx: &EvalContext) -> Result<R> {
    let (match_type, text) = match_type_and_text(raw);
    let cqr = ctx.collaborators.text_completer()?.regions(text, match_type);
    Ok(R::of_cqr(cqr))
}

fn leaf_region<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let Some(region) = parse_u32(value).map(geocqr_types::RegionId::new) else {
        return Ok(R::empty(ItemIdFlags::default()));
    };
    let cells = ctx.collaborators.geo_hierarchy.region_cells(region).to_vec();
    Ok(R::of_cqr(Cqr::full(cells, ItemIdFlags::default())))
}

fn leaf_region_exclusive_cells<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let Some(region) = parse_u32(value).map(geocqr_types::RegionId::new) else {
        return Ok(R::empty(ItemIdFlags::default()));
    };
    let cells = ctx.collaborators.geo_hierarchy.region_exclusive_cells(region).to_vec();
    Ok(R::of_cqr(Cqr::full(cells, ItemIdFlags::default())))
}

fn leaf_cell<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    if value.contains(',') {
        let points = parse_points(value);
        let Some(&point) = points.first() else {
            return Ok(R::empty(ItemIdFlags::default()));
        };
        let cell = ctx.collaborators.triangulation.cell_id(point);
        if cell.is_null() {
            return Ok(R::empty(ItemIdFlags::default()));
        }
        return Ok(R::of_cqr(Cqr::full(vec![cell], ItemIdFlags::default())));
    }
    let Some(cell) = parse_u32(value).map(CellId::new) else {
        return Ok(R::empty(ItemIdFlags::default()));
    };
    Ok(R::of_cqr(Cqr::full(vec![cell], ItemIdFlags::default())))
}

fn leaf_cells<R: ResultShape>(value: &str) -> Result<R> {
    let cells: Vec<CellId> = value.split(',').filter_map(parse_u32).map(CellId::new).collect();
    Ok(R::of_cqr(Cqr::full(cells, ItemIdFlags::default())))
}

fn leaf_triangle<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let Some(triangle) = parse_u32(value) else {
        return Ok(R::empty(ItemIdFlags::default()));
    };
    let cqr = ctx.collaborators.text_completer()?.cqr_from_triangle_id(triangle);
    Ok(R::of_cqr(cqr))
}

fn leaf_triangles<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let completer = ctx.collaborators.text_completer()?;
    let cqr = value
        .split(',')
        .filter_map(parse_u32)
        .map(|t| completer.cqr_from_triangle_id(t))
        .fold(Cqr::empty(ItemIdFlags::default()), |acc, next| acc.union(next));
    Ok(R::of_cqr(cqr))
}

fn leaf_rect<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let numbers = parse_numbers(value);
    let [lat1, lon1, lat2, lon2] = numbers[..] else {
        return Ok(R::empty(ItemIdFlags::default()));
    };
    let rect = Rect::new(
        (lon1.min(lon2), lat1.min(lat2)),
        (lon1.max(lon2), lat1.max(lat2)),
    );
    let diagonal = geo::Distance::distance(geo::Haversine, Point::from(rect.min()), Point::from(rect.max()));
    let cqr = if diagonal < RECT_DIRECT_LOOKUP_THRESHOLD_M {
        resolve_polygon(&crate::resolver::rect_to_polygon(rect), Accuracy::Auto, ctx.collaborators)
    } else {
        ctx.collaborators.text_completer()?.cqr_from_rect(rect)
    };
    Ok(R::of_cqr(cqr))
}

fn leaf_polygon<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let mut points = parse_points(value);
    if points.len() < 3 {
        return Ok(R::empty(ItemIdFlags::default()));
    }
    if points.first() != points.last() {
        points.push(points[0]);
    }
    let ring: Vec<(f64, f64)> = points.iter().map(|p| (p.x(), p.y())).collect();
    let polygon = Polygon::new(LineString::from(ring), vec![]);
    let cqr = resolve_polygon(&polygon, Accuracy::Auto, ctx.collaborators);
    Ok(R::of_cqr(cqr))
}

/// `PATH`/`POINT` (spec.md §4.5): leading number is the corridor radius in
/// meters, the rest are `lat,lon` pairs. A single point is a disc, two
/// points go through `CellTextCompleter::cqr_between`, and a longer path
/// takes the text index's own `cqr_along_path` shortcut when it's short and
/// narrow enough, else is composed from consecutive `BETWEEN` segments.
fn leaf_path<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let numbers = parse_numbers(value);
    if numbers.is_empty() {
        return Ok(R::empty(ItemIdFlags::default()));
    }
    let radius_m = numbers[0];
    let points: Vec<Point<f64>> = numbers[1..]
        .chunks_exact(2)
        .map(|pair| Point::new(pair[1], pair[0]))
        .collect();

    let cqr = match points.len() {
        0 => Cqr::empty(ItemIdFlags::default()),
        1 => resolve_point_radius(points[0], radius_m, Accuracy::Auto, ctx.collaborators),
        2 => ctx.collaborators.text_completer()?.cqr_between(points[0], points[1], radius_m),
        _ => {
            let length: f64 = points.windows(2).map(|w| geo::Distance::distance(geo::Haversine, w[0], w[1])).sum();
            if radius_m > 0.0 && length < PATH_DIRECT_LOOKUP_LENGTH_M && radius_m < PATH_DIRECT_LOOKUP_RADIUS_M {
                ctx.collaborators.text_completer()?.cqr_along_path(radius_m, &points)
            } else {
                let completer = ctx.collaborators.text_completer()?;
                let segments = points
                    .windows(2)
                    .map(|w| completer.cqr_between(w[0], w[1], radius_m))
                    .fold(Cqr::empty(ItemIdFlags::default()), |acc, next| acc.union(next));
                cell_dilate(&segments, radius_m, ctx.config.default_thread_count, ctx.collaborators)
            }
        }
    };
    Ok(R::of_cqr(cqr))
}

fn leaf_item<R: ResultShape>(value: &str, ctx: &EvalContext) -> Result<R> {
    let Some(item) = parse_u32(value).map(geocqr_types::ItemId::new) else {
        return Ok(R::empty(ItemIdFlags::default()));
    };
    let pm: Vec<(CellId, ItemIndex)> = ctx
        .collaborators
        .index_store
        .item_cells(item)
        .into_iter()
        .map(|cell| (cell, ItemIndex::single(item)))
        .collect();
    Ok(R::of_cqr(Cqr::partial(pm, ItemIdFlags::default())))
}

fn unary_fm_conversion<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let operand: R = child_result(node, 0, ctx)?;
    Ok(operand.all_to_full())
}

fn unary_cell_dilation<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let Some(distance_m) = parse_f64(&node.value) else {
        return child_result(node, 0, ctx);
    };
    let operand: R = child_result(node, 0, ctx)?;
    let cqr = operand.into_cqr(ctx.config.default_thread_count);
    let dilated = cell_dilate(&cqr, distance_m, ctx.config.default_thread_count, ctx.collaborators);
    Ok(R::of_cqr(dilated))
}

fn unary_region_dilation<R: ResultShape>(
    node: &Node,
    ctx: &EvalContext,
    dilate: fn(&Cqr, f64, &Collaborators) -> Cqr,
) -> Result<R> {
    let threshold = parse_f64(&node.value).map(|pct| pct / 100.0).unwrap_or(ctx.config.in_operator_coverage_pct);
    let operand: R = child_result(node, 0, ctx)?;
    let cqr = operand.into_cqr(ctx.config.default_thread_count);
    let dilated = dilate(&cqr, threshold, ctx.collaborators);
    Ok(R::of_cqr(dilated))
}

fn parse_direction(value: &str) -> Option<Direction> {
    match value {
        "^" | "north-of" => Some(Direction::North),
        "v" | "south-of" => Some(Direction::South),
        ">" | "east-of" => Some(Direction::East),
        "<" | "west-of" => Some(Direction::West),
        _ => None,
    }
}

fn unary_compass<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let Some(direction) = parse_direction(&node.value) else {
        return child_result(node, 0, ctx);
    };
    let operand: R = child_result(node, 0, ctx)?;
    let cqr = operand.into_cqr(ctx.config.default_thread_count);
    let subject = classify_subject(&cqr, ctx.collaborators, ctx.config);
    let polygon = synthesize_compass(&subject, direction, ctx.collaborators, ctx.config);
    let result = resolve_polygon(&polygon, Accuracy::Auto, ctx.collaborators);
    Ok(R::of_cqr(result))
}

/// `:in` is "an alias of region-dilation by item coverage at 90%" (spec.md
/// §4.4.2); the grammar carries no operand to override that percentage.
fn unary_in<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let operand: R = child_result(node, 0, ctx)?;
    let cqr = operand.into_cqr(ctx.config.default_thread_count);
    let dilated = dilate_by_item_coverage(&cqr, ctx.config.in_operator_coverage_pct, ctx.collaborators);
    Ok(R::of_cqr(dilated))
}

fn unary_near<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let operand: R = child_result(node, 0, ctx)?;
    let cqr = operand.into_cqr(ctx.config.default_thread_count);
    let dilated = cell_dilate(&cqr, ctx.config.near_default_dilation_meters, ctx.config.default_thread_count, ctx.collaborators);
    Ok(R::of_cqr(dilated))
}

/// `*` (spec.md §4.5's relevant-element operator) needs a `RoutingProvider`
/// and a second anchor point the unary grammar doesn't carry; without one
/// there is nothing principled to rank by, so the operand passes through
/// unchanged. See DESIGN.md for this Open Question resolution.
fn unary_relevant_element<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    child_result(node, 0, ctx)
}

fn unary_query_exclusive_cells<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let mut parts = node.value.splitn(2, ':');
    let Some(first) = parts.next().and_then(parse_u32) else {
        return child_result(node, 0, ctx);
    };
    // spec.md documents both a "min:max" and a bare "max" form; the latter
    // defaults `min` to 0 (examples/original_source/include/liboscar/AdvancedCellOpTree.h's
    // `calcQueryExclusiveCells`).
    let (min, max) = match parts.next().and_then(parse_u32) {
        Some(max) => (first, max),
        None => (0, first),
    };
    let operand: R = child_result(node, 0, ctx)?;
    let hierarchy = std::sync::Arc::clone(&ctx.collaborators.geo_hierarchy);
    Ok(operand.retain_cells(&move |cell| {
        let count = hierarchy.cell_parents(cell).len() as u32;
        count >= min && count <= max
    }))
}

fn binary_set_op<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let left: R = child_result(node, 0, ctx)?;
    let right: R = child_result(node, 1, ctx)?;
    Ok(match node.value.as_str() {
        "+" => left.union(right),
        "-" => left.difference(right),
        "^" => left.symmetric_difference(right),
        _ => left.intersection(right),
    })
}

fn binary_between<R: ResultShape>(node: &Node, ctx: &EvalContext) -> Result<R> {
    let left: R = child_result(node, 0, ctx)?;
    let right: R = child_result(node, 1, ctx)?;
    let left_cqr = left.into_cqr(ctx.config.default_thread_count);
    let right_cqr = right.into_cqr(ctx.config.default_thread_count);

    let subject_a = classify_subject(&left_cqr, ctx.collaborators, ctx.config);
    let subject_b = classify_subject(&right_cqr, ctx.collaborators, ctx.config);

    // The grammar carries no explicit corridor radius for `<->`; this
    // reuses the `:near` default rather than inventing a separate knob.
    let radius_m = ctx.config.near_default_dilation_meters;
    let result = between(&subject_a, &subject_b, radius_m, Accuracy::Auto, ctx.collaborators);
    Ok(R::of_cqr(result))
}

fn parse_u32(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

fn parse_numbers(s: &str) -> Vec<f64> {
    s.split(',').filter_map(parse_f64).collect()
}

/// `lat,lon` pairs to `geo::Point`s (`Point::new` takes `(lon, lat)`).
fn parse_points(s: &str) -> Vec<Point<f64>> {
    parse_numbers(s).chunks_exact(2).map(|pair| Point::new(pair[1], pair[0])).collect()
}
