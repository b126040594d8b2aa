use crate::{
    graph::AddNodeOptions,
    model::{GraphContent, Position},
};

/// Upper bound on cascade steps when looking for a free spot.
const MAX_CASCADE: usize = 64;

/// Where a new node lands when the caller gives no explicit position.
///
/// Explicit position first, then the viewport centre (cascaded by `offset`
/// past occupied spots), then `offset` from the last-added node, then the
/// origin.
pub fn default_position(
    content: &GraphContent,
    options: &AddNodeOptions,
    offset: Position,
) -> Position {
    if let Some(position) = options.position {
        return position;
    }
    if let Some(center) = options.viewport_center {
        return free_spot(content, center, offset);
    }
    match content.nodes().last() {
        Some(last) => free_spot(content, last.position().offset(offset.x, offset.y), offset),
        None => Position::default(),
    }
}

/// First spot at or after `start`, stepping by `offset`, that no node occupies.
pub(crate) fn free_spot(
    content: &GraphContent,
    start: Position,
    offset: Position,
) -> Position {
    let mut spot = start;
    for _ in 0..MAX_CASCADE {
        if !content.nodes().iter().any(|n| same_spot(n.position(), spot)) {
            break;
        }
        spot = spot.offset(offset.x, offset.y);
    }
    spot
}

fn same_spot(
    a: Position,
    b: Position,
) -> bool {
    (a.x - b.x).abs() < 0.5 && (a.y - b.y).abs() < 0.5
}
