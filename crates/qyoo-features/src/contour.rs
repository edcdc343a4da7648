//! Edge linking into ordered contour chains.

use std::collections::{HashMap, VecDeque};

use log::trace;
use nalgebra::Point2;

use crate::edge_map::{Direction, EdgeMap};
use crate::params::FeatureParams;

type Pixel = (i32, i32);

/// Ordered chain of 8-connected edge pixels (pixel centres).
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    pub points: Vec<Point2<f32>>,
    /// First and last point lie within the link gap of each other.
    pub closed: bool,
}

impl Contour {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

struct Tracer<'a> {
    edges: &'a EdgeMap,
    visited: Vec<bool>,
}

impl Tracer<'_> {
    #[inline]
    fn index(&self, (x, y): Pixel) -> usize {
        y as usize * self.edges.width() + x as usize
    }

    #[inline]
    fn is_free(&self, p: Pixel) -> bool {
        self.edges.get_signed(p.0, p.1).is_some() && !self.visited[self.index(p)]
    }

    /// Next unvisited neighbour: smallest turn from `heading`, then lowest
    /// row-major index. Without a heading only the index counts.
    fn next(&self, cur: Pixel, heading: Option<u8>) -> Option<(Pixel, u8)> {
        let mut best: Option<((u8, usize), Pixel, u8)> = None;
        for dir in Direction::ALL {
            let (dx, dy) = dir.offset();
            let p = (cur.0 + dx, cur.1 + dy);
            if !self.is_free(p) {
                continue;
            }
            let turn = heading.map_or(0, |h| {
                let d = (dir.index() + 8 - h) % 8;
                d.min(8 - d)
            });
            let key = (turn, self.index(p));
            if best.as_ref().is_none_or(|(k, _, _)| key < *k) {
                best = Some((key, p, dir.index()));
            }
        }
        best.map(|(_, p, d)| (p, d))
    }

    fn walk(&mut self, seed: Pixel) -> Vec<Pixel> {
        let mut out = Vec::new();
        let mut cur = seed;
        let mut heading = None;
        while let Some((p, d)) = self.next(cur, heading) {
            let i = self.index(p);
            self.visited[i] = true;
            out.push(p);
            cur = p;
            heading = Some(d);
        }
        out
    }

    fn trace_from(&mut self, seed: Pixel) -> Vec<Pixel> {
        let i = self.index(seed);
        self.visited[i] = true;
        let forward = self.walk(seed);
        let backward = self.walk(seed);
        let mut chain = Vec::with_capacity(forward.len() + backward.len() + 1);
        chain.extend(backward.into_iter().rev());
        chain.push(seed);
        chain.extend(forward);
        chain
    }
}

#[inline]
fn gap(a: Pixel, b: Pixel) -> f32 {
    let dx = (a.0 - b.0) as f32;
    let dy = (a.1 - b.1) as f32;
    (dx * dx + dy * dy).sqrt()
}

fn is_closed(chain: &VecDeque<Pixel>, link_gap: f32) -> bool {
    match (chain.front(), chain.back()) {
        (Some(&a), Some(&b)) if chain.len() >= 3 => gap(a, b) <= link_gap,
        _ => false,
    }
}

/// Chain endpoints bucketed on a grid of `link_gap` cells.
///
/// Entries are never removed; lookups skip chains that are done (closed or
/// absorbed) and pixels that are no longer an endpoint.
struct EndpointIndex {
    cell: f32,
    buckets: HashMap<Pixel, Vec<(usize, Pixel)>>,
}

impl EndpointIndex {
    fn new(link_gap: f32) -> Self {
        Self {
            cell: link_gap.max(1.0),
            buckets: HashMap::new(),
        }
    }

    #[inline]
    fn key(&self, p: Pixel) -> Pixel {
        (
            (p.0 as f32 / self.cell).floor() as i32,
            (p.1 as f32 / self.cell).floor() as i32,
        )
    }

    fn insert(&mut self, id: usize, chain: &VecDeque<Pixel>) {
        for p in [chain.front(), chain.back()].into_iter().flatten() {
            let key = self.key(*p);
            self.buckets.entry(key).or_default().push((id, *p));
        }
    }

    /// Closest live endpoint of another chain within `link_gap` of `p`.
    fn nearest(
        &self,
        p: Pixel,
        skip: usize,
        chains: &[VecDeque<Pixel>],
        done: &[bool],
        link_gap: f32,
    ) -> Option<(f32, usize)> {
        let (kx, ky) = self.key(p);
        let mut best: Option<(f32, usize)> = None;
        for cy in ky - 1..=ky + 1 {
            for cx in kx - 1..=kx + 1 {
                let Some(entries) = self.buckets.get(&(cx, cy)) else {
                    continue;
                };
                for &(id, q) in entries {
                    if id == skip || done[id] {
                        continue;
                    }
                    let c = &chains[id];
                    if c.front() != Some(&q) && c.back() != Some(&q) {
                        continue;
                    }
                    let d = gap(p, q);
                    if d <= link_gap && best.is_none_or(|b| (d, id) < b) {
                        best = Some((d, id));
                    }
                }
            }
        }
        best
    }
}

/// Append `small` to `big` at the closest pair of endpoints.
fn join(big: &mut VecDeque<Pixel>, small: VecDeque<Pixel>) {
    let (Some(&a0), Some(&a1)) = (big.front(), big.back()) else {
        *big = small;
        return;
    };
    let (Some(&b0), Some(&b1)) = (small.front(), small.back()) else {
        return;
    };
    let options = [
        (gap(a1, b0), 0u8),
        (gap(a1, b1), 1),
        (gap(a0, b1), 2),
        (gap(a0, b0), 3),
    ];
    let how = options
        .into_iter()
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map_or(0, |(_, how)| how);
    match how {
        0 => big.extend(small),
        1 => big.extend(small.into_iter().rev()),
        2 => small.into_iter().rev().for_each(|p| big.push_front(p)),
        _ => small.into_iter().for_each(|p| big.push_front(p)),
    }
}

fn link_chains(chains: &mut [VecDeque<Pixel>], link_gap: f32) {
    let mut done: Vec<bool> = chains.iter().map(|c| is_closed(c, link_gap)).collect();
    let mut index = EndpointIndex::new(link_gap);
    for (id, chain) in chains.iter().enumerate() {
        if !done[id] {
            index.insert(id, chain);
        }
    }

    for i in 0..chains.len() {
        while !done[i] && !chains[i].is_empty() {
            let (Some(&a0), Some(&a1)) = (chains[i].front(), chains[i].back()) else {
                break;
            };
            let candidates = [
                index.nearest(a0, i, chains, &done, link_gap),
                index.nearest(a1, i, chains, &done, link_gap),
            ];
            let Some((_, j)) = candidates
                .into_iter()
                .flatten()
                .min_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)))
            else {
                break;
            };

            trace!(
                "contour: joined chain {j} ({} px) onto chain {i} ({} px)",
                chains[j].len(),
                chains[i].len()
            );
            let mut other = std::mem::take(&mut chains[j]);
            if other.len() > chains[i].len() {
                std::mem::swap(&mut other, &mut chains[i]);
            }
            join(&mut chains[i], other);
            done[j] = true;
            if is_closed(&chains[i], link_gap) {
                done[i] = true;
            } else {
                index.insert(i, &chains[i]);
            }
        }
    }
}

/// Trace every edge pixel into ordered chains.
///
/// Seeds are taken in row-major order and traced in both directions, so a
/// seed in the middle of a curve still yields a single chain.
pub fn trace_contours(edges: &EdgeMap, params: &FeatureParams) -> Vec<Contour> {
    let mut tracer = Tracer {
        edges,
        visited: vec![false; edges.width() * edges.height()],
    };

    let mut chains: Vec<VecDeque<Pixel>> = Vec::new();
    for (x, y, _) in edges.iter_edges() {
        let seed = (x as i32, y as i32);
        if tracer.visited[tracer.index(seed)] {
            continue;
        }
        chains.push(tracer.trace_from(seed).into());
    }

    link_chains(&mut chains, params.link_gap);

    chains
        .into_iter()
        .filter(|c| c.len() >= params.min_contour_len.max(1))
        .map(|c| Contour {
            closed: is_closed(&c, params.link_gap),
            points: c
                .into_iter()
                .map(|(x, y)| Point2::new(x as f32, y as f32))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(w: usize, h: usize, pixels: &[(usize, usize)]) -> EdgeMap {
        let mut map = EdgeMap::new(w, h).unwrap();
        for &(x, y) in pixels {
            map.set(x, y, Some(Direction::North));
        }
        map
    }

    fn params(min_len: usize) -> FeatureParams {
        FeatureParams {
            min_contour_len: min_len,
            ..FeatureParams::default()
        }
    }

    #[test]
    fn seed_in_the_middle_yields_one_chain() {
        // a "V": the row-major first pixel is the tip of the left arm
        let mut pixels = Vec::new();
        for i in 0..10 {
            pixels.push((i, i));
            pixels.push((20 - i, i));
        }
        pixels.push((10, 10));
        let map = map_with(24, 24, &pixels);
        let contours = trace_contours(&map, &params(3));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 21);
        assert!(!contours[0].closed);
    }

    #[test]
    fn square_outline_is_closed() {
        let mut pixels = Vec::new();
        for i in 5..25 {
            pixels.push((i, 5));
            pixels.push((i, 24));
            pixels.push((5, i));
            pixels.push((24, i));
        }
        pixels.sort();
        pixels.dedup();
        let map = map_with(30, 30, &pixels);
        let contours = trace_contours(&map, &params(10));
        assert_eq!(contours.len(), 1);
        assert!(contours[0].closed);
        assert_eq!(contours[0].len(), pixels.len());
    }

    #[test]
    fn small_gaps_are_linked_and_short_chains_dropped() {
        let mut pixels: Vec<(usize, usize)> = (0..10).map(|x| (x, 3)).collect();
        pixels.extend((12..22).map(|x| (x, 3)));
        pixels.push((40, 20));
        let map = map_with(50, 30, &pixels);
        let contours = trace_contours(&map, &params(5));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 20);
        let xs: Vec<f32> = contours[0].points.iter().map(|p| p.x).collect();
        assert!(xs.windows(2).all(|w| (w[1] - w[0]).abs() <= 3.0));
    }

    #[test]
    fn dashed_line_links_into_one_ordered_chain() {
        let pixels: Vec<(usize, usize)> = (0..100)
            .flat_map(|dash| (0..5).map(move |k| (dash * 7 + k, 7)))
            .collect();
        let map = map_with(710, 16, &pixels);
        let contours = trace_contours(&map, &params(5));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 500);
        assert!(!contours[0].closed);
        let xs: Vec<f32> = contours[0].points.iter().map(|p| p.x).collect();
        let rising = xs.windows(2).all(|w| w[1] > w[0] && w[1] - w[0] <= 3.0);
        let falling = xs.windows(2).all(|w| w[0] > w[1] && w[0] - w[1] <= 3.0);
        assert!(rising || falling);
    }

    #[test]
    fn dense_noise_covers_every_edge_pixel_once() {
        let (w, h) = (640, 480);
        let mut map = EdgeMap::new(w, h).unwrap();
        let mut state = 0x1234_5678u32;
        for y in 0..h {
            for x in 0..w {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                if (state >> 24) % 10 < 3 {
                    map.set(x, y, Some(Direction::ALL[(state >> 8) as usize % 8]));
                }
            }
        }
        let contours = trace_contours(&map, &params(1));
        let total: usize = contours.iter().map(Contour::len).sum();
        assert_eq!(total, map.edge_count());
        let unique: std::collections::HashSet<(i32, i32)> = contours
            .iter()
            .flat_map(|c| c.points.iter().map(|p| (p.x as i32, p.y as i32)))
            .collect();
        assert_eq!(unique.len(), total);
    }
}
