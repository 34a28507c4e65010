use crate::corner::Corner;
use crate::geom::{angle_diff_abs, axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Rotation2, Vector2};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    #[inline]
    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Spacing window and board rotation shared by every node.
#[derive(Clone, Copy, Debug)]
pub struct GraphFrame {
    pub min_spacing: f32,
    pub max_spacing: f32,
    /// Board axis closest to the image x axis, radians.
    pub axis_angle: f32,
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    frame: &GraphFrame,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // Adjacent X-junctions alternate their bright diagonal.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < frame.min_spacing || distance > frame.max_spacing {
        return None;
    }

    // The edge runs along a board axis, i.e. at ~45° to both diagonals.
    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - FRAC_PI_4).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - FRAC_PI_4).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    let direction = direction_quadrant(&vec_to_neighbor, frame.axis_angle);
    let score_orientation =
        (FRAC_PI_2 - angle_diff_abs(corner.orientation, neighbor.orientation)).abs();

    Some(NodeNeighbor {
        direction,
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + score_orientation,
    })
}

/// Classify an edge in the board-aligned frame (image frame rotated by `axis_angle`).
fn direction_quadrant(v: &Vector2<f32>, axis_angle: f32) -> NeighborDirection {
    let v = Rotation2::new(-axis_angle) * v;
    if v.x.abs() > v.y.abs() {
        if v.x >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if v.y >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = match candidate.direction {
            NeighborDirection::Right => &mut best[0],
            NeighborDirection::Left => &mut best[1],
            NeighborDirection::Up => &mut best[2],
            NeighborDirection::Down => &mut best[3],
        };

        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };

        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

pub struct GridGraph {
    /// For each node, its accepted neighbors.
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, frame: &GraphFrame) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }
        let tree = build_tree(corners);
        let mut neighbors = Vec::with_capacity(corners.len());

        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let candidates = tree
                .nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1)
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params, frame))
                .collect();
            neighbors.push(select_neighbors(candidates));
        }

        // Keep only mutual edges with opposite directions.
        let mutual: Vec<Vec<NodeNeighbor>> = neighbors
            .iter()
            .enumerate()
            .map(|(i, list)| {
                list.iter()
                    .filter(|n| {
                        neighbors[n.index].iter().any(|back| {
                            back.index == i && back.direction.step() == negate(n.direction.step())
                        })
                    })
                    .map(|n| NodeNeighbor {
                        direction: n.direction,
                        index: n.index,
                        distance: n.distance,
                        score: n.score,
                    })
                    .collect()
            })
            .collect();

        Self { neighbors: mutual }
    }
}

fn negate((a, b): (i32, i32)) -> (i32, i32) {
    (-a, -b)
}

fn build_tree(corners: &[Corner]) -> KdTree<f32, 2> {
    let coords = corners
        .iter()
        .map(|c| [c.position.x, c.position.y])
        .collect::<Vec<_>>();
    (&coords).into()
}

/// Median distance from each corner to its nearest other corner.
pub fn median_nearest_spacing(corners: &[Corner]) -> Option<f32> {
    if corners.len() < 2 {
        return None;
    }
    let tree = build_tree(corners);
    let mut d: Vec<f32> = corners
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            tree.nearest_n::<SquaredEuclidean>(&[c.position.x, c.position.y], 2)
                .into_iter()
                .find(|nn| nn.item as usize != i)
                .map(|nn| nn.distance.sqrt())
        })
        .filter(|d| *d > 0.0)
        .collect();
    if d.is_empty() {
        return None;
    }
    d.sort_by(|a, b| a.total_cmp(b));
    Some(d[d.len() / 2])
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates for a component, shifted so the minimum is `(0, 0)`.
///
/// Nodes that would land on an already occupied cell are dropped.
pub fn assign_grid_coordinates(graph: &GridGraph, component: &[usize]) -> Vec<(usize, i32, i32)> {
    let Some(&start) = component.first() else {
        return Vec::new();
    };

    let mut coords = Vec::with_capacity(component.len());
    let mut visited = vec![false; graph.neighbors.len()];
    let mut occupied: HashMap<(i32, i32), usize> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back((start, 0, 0));

    while let Some((node, i, j)) = queue.pop_front() {
        if visited[node] {
            continue;
        }
        visited[node] = true;
        if occupied.contains_key(&(i, j)) {
            continue;
        }
        occupied.insert((i, j), node);
        coords.push((node, i, j));

        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            queue.push_back((neighbor.index, i + di, j + dj));
        }
    }

    let min_i = coords.iter().map(|c| c.1).min().unwrap_or(0);
    let min_j = coords.iter().map(|c| c.2).min().unwrap_or(0);
    coords
        .into_iter()
        .map(|(n, i, j)| (n, i - min_i, j - min_j))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner::new(x, y, orientation, 1.0)
    }

    fn frame(min: f32, max: f32) -> GraphFrame {
        GraphFrame {
            min_spacing: min,
            max_spacing: max,
            axis_angle: 0.0,
        }
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    fn regular_grid(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let orientation = if (i + j) % 2 == 0 {
                    FRAC_PI_4
                } else {
                    3.0 * FRAC_PI_4
                };
                corners.push(make_corner(i as f32 * spacing, j as f32 * spacing, orientation));
            }
        }
        corners
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let cols = 3;
        let corners = regular_grid(cols, 3, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &frame(5.0, 15.0));
        let idx = |i: usize, j: usize| j * cols + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_neighbors_when_orientation_relation_invalid() {
        let corners = vec![make_corner(0.0, 0.0, FRAC_PI_4), make_corner(10.0, 0.0, FRAC_PI_4)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &frame(5.0, 15.0));
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn rejects_neighbors_outside_distance_window() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(30.0, 0.0, 3.0 * FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &frame(5.0, 15.0));
        assert!(graph.neighbors[0].is_empty());
    }

    #[test]
    fn rotated_board_uses_board_axes_for_directions() {
        let angle = 0.3f32;
        let rot = Rotation2::new(angle);
        let corners: Vec<Corner> = regular_grid(3, 3, 10.0)
            .into_iter()
            .map(|c| {
                let p = rot * c.position.coords;
                make_corner(p.x + 50.0, p.y + 50.0, c.orientation + angle)
            })
            .collect();
        let mut f = frame(5.0, 15.0);
        f.axis_angle = angle;
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &f);
        let center = neighbor_map(&graph.neighbors[4]);
        assert_eq!(center[&NeighborDirection::Right].index, 5);
        assert_eq!(center[&NeighborDirection::Down].index, 7);
    }

    #[test]
    fn bfs_assigns_shifted_coordinates_to_a_component() {
        let corners = regular_grid(4, 3, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &frame(5.0, 15.0));
        let components = connected_components(&graph);
        assert_eq!(components.len(), 1);
        let coords = assign_grid_coordinates(&graph, &components[0]);
        assert_eq!(coords.len(), 12);
        for (node, i, j) in coords {
            assert_eq!(node, j as usize * 4 + i as usize);
        }
    }

    #[test]
    fn median_spacing_of_a_regular_grid() {
        let corners = regular_grid(4, 4, 12.0);
        let s = median_nearest_spacing(&corners).expect("spacing");
        assert!((s - 12.0).abs() < 1e-4);
    }
}
