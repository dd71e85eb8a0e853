use crate::domain::coords::{DCoord, FCoord};
use crate::domain::graph::NodeArena;
use crate::domain::node::NodeData;

pub mod dot_exporter;

/// Render-side storage of node positions, keyed by node index.
pub trait CoordinateSource {
    fn get_coord(&self, index: u32) -> Option<FCoord>;
}

/// Camera/projection transform from graph space to the screen.
pub trait Projector {
    fn project(&self, point: FCoord) -> DCoord;
}

pub trait GraphExporter {
    fn export(&self, arena: &NodeArena, path: &str) -> std::io::Result<()>;
}

/// Screen position of a node, or `None` if it was recorded but never rendered.
pub fn screen_pos(
    node: &NodeData,
    source: &dyn CoordinateSource,
    projector: &dyn Projector,
) -> Option<DCoord> {
    source
        .get_coord(node.index())
        .map(|graph_pos| projector.project(graph_pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coords::VCoord;
    use std::collections::HashMap;

    struct Rendered(HashMap<u32, FCoord>);

    impl CoordinateSource for Rendered {
        fn get_coord(&self, index: u32) -> Option<FCoord> {
            self.0.get(&index).copied()
        }
    }

    /// Orthographic projection onto a 100x100 viewport.
    struct Flat;

    impl Projector for Flat {
        fn project(&self, p: FCoord) -> DCoord {
            DCoord {
                x: p.x as f64 + 50.0,
                y: p.y as f64 + 50.0,
                z: p.z as f64,
            }
        }
    }

    #[test]
    fn test_screen_pos_uses_rendered_coordinate() {
        let mut rendered = HashMap::new();
        rendered.insert(2, FCoord { x: 1.0, y: -2.0, z: 3.0 });
        let source = Rendered(rendered);

        let drawn = NodeData::external(2, VCoord::default(), 0);
        let pos = screen_pos(&drawn, &source, &Flat).unwrap();
        assert_eq!(pos, DCoord { x: 51.0, y: 48.0, z: 3.0 });

        let undrawn = NodeData::external(3, VCoord::default(), 0);
        assert!(screen_pos(&undrawn, &source, &Flat).is_none());
    }
}
