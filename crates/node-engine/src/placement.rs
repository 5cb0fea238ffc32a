//! Sizing and positioning of materialized output nodes
//!
//! Outputs form a column to the right of the node that produced them. The
//! first output is centered on its producer; later ones stack downwards.

use crate::config::LayoutConfig;
use crate::constants::params;
use crate::types::Node;

/// Size of an image output node for a result of `width` x `height` pixels
///
/// The aspect ratio is kept and the shorter side becomes
/// `output_base_size`. Unknown dimensions give a square.
pub fn image_output_size(width: u32, height: u32, layout: &LayoutConfig) -> (f64, f64) {
    let base = layout.output_base_size;
    if width == 0 || height == 0 {
        return (base, base);
    }
    let aspect = f64::from(width) / f64::from(height);
    if aspect >= 1.0 {
        (base * aspect, base)
    } else {
        (base, base / aspect)
    }
}

/// Size of a mesh output node
pub fn mesh_output_size(layout: &LayoutConfig) -> (f64, f64) {
    (layout.mesh_output_size, layout.mesh_output_size)
}

/// X coordinate of a producer's output column
pub fn output_column_x(producer: &Node, layout: &LayoutConfig) -> f64 {
    producer.right() + layout.horizontal_gap
}

/// Existing output nodes that belong to `producer`'s output column
///
/// An output belongs to the column when it was generated by the producer.
/// Outputs without provenance count when they sit in the column itself.
pub fn sibling_outputs<'a>(
    nodes: &'a [Node],
    producer: &Node,
    layout: &LayoutConfig,
) -> Vec<&'a Node> {
    let column_x = output_column_x(producer, layout);
    nodes
        .iter()
        .filter(|node| node.id != producer.id)
        .filter(|node| node.kind().is_some_and(|kind| kind.is_output()))
        .filter(|node| node.x >= producer.right())
        .filter(|node| match node.param_str(params::SOURCE_NODE_ID) {
            Some(source) => source == producer.id,
            None => (node.x - column_x).abs() < 1.0,
        })
        .collect()
}

/// Top-left corner for a new output node of `size` next to `producer`
pub fn output_position(
    producer: &Node,
    siblings: &[&Node],
    size: (f64, f64),
    layout: &LayoutConfig,
) -> (f64, f64) {
    let x = output_column_x(producer, layout);
    let lowest = siblings.iter().map(|node| node.bottom()).reduce(f64::max);
    let y = match lowest {
        Some(bottom) => bottom + layout.vertical_gap,
        None => producer.y + producer.height / 2.0 - size.1 / 2.0,
    };
    (x, y)
}
