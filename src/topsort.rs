//! Depth-first topological ordering.
//!
//! Shared by the lattice (node renumbering) and the clustering (final
//! ordering of confusion bins). Both visit successors in ascending id order
//! and prepend each vertex when it finishes, so the result is the reversed
//! DFS post-order.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Topologically order the vertices `0..successors.len()`.
///
/// `successors[v]` lists the targets of `v`'s outgoing edges in the order
/// they should be explored. `roots` gives the order in which unvisited
/// vertices start a new search; every vertex must appear in it for the
/// result to be a permutation. The walk is iterative, so deep lattices do
/// not exhaust the stack.
pub fn dfs_order<I>(successors: &[Vec<usize>], roots: I) -> Vec<usize>
where
    I: IntoIterator<Item = usize>,
{
    let n = successors.len();
    let mut color = vec![Color::White; n];
    let mut finished = Vec::with_capacity(n);
    // (vertex, index of the next successor to explore)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in roots {
        if color[root] != Color::White {
            continue;
        }
        color[root] = Color::Grey;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let vertex = top.0;
            match successors[vertex].get(top.1) {
                Some(&next) => {
                    top.1 += 1;
                    if color[next] == Color::White {
                        color[next] = Color::Grey;
                        stack.push((next, 0));
                    }
                }
                None => {
                    color[vertex] = Color::Black;
                    finished.push(vertex);
                    stack.pop();
                }
            }
        }
    }

    finished.reverse();
    finished
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[usize], v: usize) -> usize {
        order.iter().position(|&x| x == v).unwrap()
    }

    #[test]
    fn test_chain_is_ordered() {
        let succ = vec![vec![1], vec![2], vec![]];
        assert_eq!(dfs_order(&succ, (0..3).rev()), vec![0, 1, 2]);
        assert_eq!(dfs_order(&succ, 0..3), vec![0, 1, 2]);
    }

    #[test]
    fn test_reversed_numbering() {
        // 2 -> 1 -> 0
        let succ = vec![vec![], vec![0], vec![1]];
        assert_eq!(dfs_order(&succ, (0..3).rev()), vec![2, 1, 0]);
    }

    #[test]
    fn test_diamond_respects_edges() {
        // 3 -> {0, 2}, 0 -> 1, 2 -> 1
        let succ = vec![vec![1], vec![], vec![1], vec![0, 2]];
        let order = dfs_order(&succ, 0..4);
        assert_eq!(order.len(), 4);
        for (from, targets) in succ.iter().enumerate() {
            for &to in targets {
                assert!(position(&order, from) < position(&order, to));
            }
        }
    }

    #[test]
    fn test_disconnected_vertices_all_present() {
        let succ = vec![vec![], vec![], vec![]];
        let mut order = dfs_order(&succ, 0..3);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_matches_recursive_post_order() {
        // Roots visited 0..n: the last root to finish ends up first.
        let succ = vec![vec![], vec![], vec![0]];
        assert_eq!(dfs_order(&succ, 0..3), vec![2, 1, 0]);
    }
}
