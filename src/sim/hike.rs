//! Hikes: a small hidden map explored with the 🧭.
//!
//! The map is a taxicab disc of radius [`RADIUS`] around the origin. Its
//! passable tiles form a tree grown outward from the origin, so every tile
//! has exactly one route back. A move is always [`RADIUS`] steps long and
//! starts at the origin; it stops early at a tree or at the destination 📍.
//!
//! Generation is seeded, which keeps the hike transitions pure: the same
//! world always produces the same map.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::items::{strip_variation_selectors, Item};

pub const RADIUS: i32 = 4;
/// Steps in one move.
pub const STEPS: usize = RADIUS as usize;
const SIZE: i32 = RADIUS * 2 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Right,
    Down,
    Left,
    Up,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Right,
        Direction::Down,
        Direction::Left,
        Direction::Up,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            Direction::Right => "➡️",
            Direction::Down => "⬇️",
            Direction::Left => "⬅️",
            Direction::Up => "⬆️",
        }
    }

    fn offset(self) -> (i32, i32) {
        match self {
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Up => (0, -1),
        }
    }

    fn from_char(c: char) -> Option<Direction> {
        match c.to_ascii_lowercase() {
            '➡' | '→' | 'r' => Some(Direction::Right),
            '⬇' | '↓' | 'd' => Some(Direction::Down),
            '⬅' | '←' | 'l' => Some(Direction::Left),
            '⬆' | '↑' | 'u' => Some(Direction::Up),
            _ => None,
        }
    }

    /// Parse one move from arrows or `r`/`d`/`l`/`u` letters, with or
    /// without spaces. Anything but exactly [`STEPS`] directions is `None`.
    pub fn parse_move(text: &str) -> Option<[Direction; STEPS]> {
        let directions = strip_variation_selectors(text)
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(Direction::from_char)
            .collect::<Option<Vec<_>>>()?;
        directions.try_into().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tile {
    /// Beyond the disc.
    Outside,
    Pine,
    Tree,
    Ground,
    Origin,
    Destination,
    Resource(Item),
}

impl Tile {
    pub fn emoji(self) -> &'static str {
        match self {
            Tile::Outside => "⬜",
            Tile::Pine => "🌲",
            Tile::Tree => "🌳",
            Tile::Ground => "🟩",
            Tile::Origin => "✴️",
            Tile::Destination => "📍",
            Tile::Resource(item) => item.emoji(),
        }
    }

    pub fn blocks(self) -> bool {
        matches!(self, Tile::Pine | Tile::Tree)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

type Step = (Direction, Tile);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hike {
    map: Vec<Tile>,
    revealed: Vec<bool>,
    pub resource: Option<Item>,
    pub gathered: Vec<Item>,
    pub moves: Vec<Vec<Step>>,
}

fn index(x: i32, y: i32) -> Option<usize> {
    if (0..SIZE).contains(&x) && (0..SIZE).contains(&y) {
        Some((y * SIZE + x) as usize)
    } else {
        None
    }
}

fn in_disc(x: i32, y: i32) -> bool {
    (RADIUS - x).abs() + (RADIUS - y).abs() <= RADIUS
}

fn neighbours((x, y): (i32, i32)) -> impl Iterator<Item = (i32, i32)> {
    Direction::ALL
        .into_iter()
        .map(move |d| {
            let (dx, dy) = d.offset();
            (x + dx, y + dy)
        })
        .filter(|(x, y)| in_disc(*x, *y))
}

impl Hike {
    /// Lay out a new map. With `with_resource`, a 🥕 or 🪨 waits somewhere on
    /// the trail.
    pub fn generate(seed: u64, with_resource: bool) -> Hike {
        let mut rng = StdRng::seed_from_u64(seed);
        let origin = (RADIUS, RADIUS);
        // A taxicab disc covers about half its bounding square; two thirds
        // of that is passable.
        let area = (SIZE * SIZE / 2) as usize;
        let wanted = (area * 2 + 1) / 3;

        let mut distances: BTreeMap<(i32, i32), u32> = BTreeMap::new();
        distances.insert(origin, 0);
        let mut frontier: Vec<((i32, i32), u32)> = neighbours(origin).map(|c| (c, 1)).collect();
        while distances.len() < wanted && !frontier.is_empty() {
            let (cell, distance) = frontier.swap_remove(rng.gen_range(0..frontier.len()));
            if distances.contains_key(&cell) {
                continue;
            }
            // One open neighbour keeps the trail a tree.
            if neighbours(cell).filter(|n| distances.contains_key(n)).count() != 1 {
                continue;
            }
            distances.insert(cell, distance);
            if distance < RADIUS as u32 {
                frontier.extend(
                    neighbours(cell)
                        .filter(|n| !distances.contains_key(n))
                        .map(|n| (n, distance + 1)),
                );
            }
        }

        let mut map = vec![Tile::Outside; (SIZE * SIZE) as usize];
        for y in 0..SIZE {
            for x in 0..SIZE {
                if !in_disc(x, y) {
                    continue;
                }
                let tree = if rng.gen_bool(0.25) { Tile::Tree } else { Tile::Pine };
                let tile = if distances.contains_key(&(x, y)) { Tile::Ground } else { tree };
                map[(y * SIZE + x) as usize] = tile;
            }
        }

        let farthest = distances.values().copied().max().unwrap_or(0);
        let ends: Vec<(i32, i32)> = distances
            .iter()
            .filter(|(_, d)| **d == farthest)
            .map(|(cell, _)| *cell)
            .collect();
        let destination = ends[rng.gen_range(0..ends.len())];

        let mut revealed = vec![false; map.len()];
        for (x, y) in [origin, destination] {
            let i = (y * SIZE + x) as usize;
            revealed[i] = true;
        }
        map[(origin.1 * SIZE + origin.0) as usize] = Tile::Origin;
        map[(destination.1 * SIZE + destination.0) as usize] = Tile::Destination;

        let mut resource = None;
        if with_resource {
            let spots: Vec<(i32, i32)> = distances
                .keys()
                .copied()
                .filter(|cell| *cell != origin && *cell != destination)
                .collect();
            if !spots.is_empty() {
                let item = if rng.gen_bool(0.5) { Item::Carrot } else { Item::Stone };
                let (x, y) = spots[rng.gen_range(0..spots.len())];
                map[(y * SIZE + x) as usize] = Tile::Resource(item);
                resource = Some(item);
            }
        }

        Hike {
            map,
            revealed,
            resource,
            gathered: Vec::new(),
            moves: Vec::new(),
        }
    }

    /// True once the last move ended on 📍.
    pub fn finished(&self) -> bool {
        self.moves
            .last()
            .and_then(|steps| steps.last())
            .is_some_and(|(_, tile)| *tile == Tile::Destination)
    }

    pub fn tile(&self, x: i32, y: i32) -> Tile {
        index(x, y).map(|i| self.map[i]).unwrap_or(Tile::Outside)
    }

    /// Walk one move from the origin, revealing every tile stepped on and
    /// picking up the resource if the path crosses it.
    pub fn walk(&mut self, directions: [Direction; STEPS]) -> Vec<Step> {
        let (mut x, mut y) = (RADIUS, RADIUS);
        let mut steps = Vec::with_capacity(STEPS);
        for direction in directions {
            let (dx, dy) = direction.offset();
            x += dx;
            y += dy;
            let Some(i) = index(x, y) else {
                break;
            };
            let tile = self.map[i];
            steps.push((direction, tile));
            self.revealed[i] = true;
            if tile.blocks() || tile == Tile::Destination {
                break;
            }
            if let Tile::Resource(item) = tile {
                self.gathered.push(item);
                self.map[i] = Tile::Ground;
            }
        }
        self.moves.push(steps.clone());
        steps
    }

    /// Shortest directions from the origin to the first `target` tile within
    /// one move's reach. Like a walk, a route never continues past a tree or
    /// the destination.
    pub fn find_path(&self, target: Tile) -> Option<Vec<Direction>> {
        let origin = (RADIUS, RADIUS);
        let mut queue = VecDeque::from([(origin, Vec::new())]);
        let mut seen = vec![origin];
        while let Some(((x, y), path)) = queue.pop_front() {
            let tile = self.tile(x, y);
            if tile == target {
                return Some(path);
            }
            if tile.blocks() || tile == Tile::Destination || path.len() >= STEPS {
                continue;
            }
            for direction in Direction::ALL {
                let (dx, dy) = direction.offset();
                let next = (x + dx, y + dy);
                if index(next.0, next.1).is_none() || seen.contains(&next) {
                    continue;
                }
                seen.push(next);
                let mut longer = path.clone();
                longer.push(direction);
                queue.push_back((next, longer));
            }
        }
        None
    }

    /// The map as rows of emoji. Tiles not yet visited show as ⬜ unless
    /// `reveal_all` is set.
    pub fn render(&self, reveal_all: bool) -> String {
        (0..SIZE)
            .map(|y| {
                (0..SIZE)
                    .map(|x| {
                        let i = (y * SIZE + x) as usize;
                        if reveal_all || self.revealed[i] {
                            self.map[i].emoji()
                        } else {
                            Tile::Outside.emoji()
                        }
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn format_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|(direction, tile)| format!("{}{}", direction.emoji(), tile))
        .collect::<Vec<_>>()
        .join(" ")
}
