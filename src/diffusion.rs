//! Trickle-down: bounded multi-source breadth-first spread with decay.
//!
//! Each source runs its own BFS over the 8-connected mesh into a private
//! contribution buffer, so sources never see each other's partial results.
//! Buffers are produced in parallel and summed in source order; overlapping
//! influence zones add.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::attr::AttrValue;
use crate::error::{GridError, Result};
use crate::index::GridIndex;

/// Per-hop transformation of a spreading value.
///
/// String form: `*f` multiplies, `-a` subtracts, `+a` or a bare number adds,
/// `taper` fades linearly to zero at the edge of the step budget.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DecayRule {
    Multiply(f64),
    Subtract(f64),
    Add(f64),
    /// Subtract `seed / steps` per hop.
    Taper,
}

impl DecayRule {
    /// Value handed to the next ring out.
    #[inline]
    pub fn next(&self, value: f64, seed: f64, steps: u32) -> f64 {
        match *self {
            DecayRule::Multiply(f) => value * f,
            DecayRule::Subtract(a) => value - a,
            DecayRule::Add(a) => value + a,
            DecayRule::Taper if steps == 0 => value,
            DecayRule::Taper => value - seed / steps as f64,
        }
    }
}

impl FromStr for DecayRule {
    type Err = GridError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("taper") {
            return Ok(DecayRule::Taper);
        }
        let (make, body): (fn(f64) -> DecayRule, &str) = if let Some(r) = t.strip_prefix('*') {
            (DecayRule::Multiply, r)
        } else if let Some(r) = t.strip_prefix('-') {
            (DecayRule::Subtract, r)
        } else if let Some(r) = t.strip_prefix('+') {
            (DecayRule::Add, r)
        } else {
            (DecayRule::Add, t)
        };
        match body.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(make(v)),
            _ => Err(GridError::InvalidDecay(s.to_string())),
        }
    }
}

impl fmt::Display for DecayRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecayRule::Multiply(v) => write!(f, "*{v}"),
            DecayRule::Subtract(v) => write!(f, "-{v}"),
            DecayRule::Add(v) => write!(f, "+{v}"),
            DecayRule::Taper => f.write_str("taper"),
        }
    }
}

impl TryFrom<String> for DecayRule {
    type Error = GridError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DecayRule> for String {
    fn from(d: DecayRule) -> Self {
        d.to_string()
    }
}

impl GridIndex {
    /// Spread `attribute` outward from `sources` for up to `steps` hops and
    /// overwrite `attribute` on every cell with the summed contributions
    /// (0 where nothing arrived).
    ///
    /// Each source seeds with `initial_value`, or with its own current value
    /// of `attribute` when none is given.
    pub fn trickle_down(
        &mut self,
        sources: &[usize],
        steps: u32,
        attribute: &str,
        decay: DecayRule,
        initial_value: Option<f64>,
    ) -> Result<()> {
        let seeds = self.seeds(sources, attribute, initial_value)?;
        if let Some(c) = self
            .cells()
            .iter()
            .find(|c| matches!(c.get(attribute), Some(AttrValue::Text(_))))
        {
            return Err(GridError::KindMismatch {
                attribute: attribute.to_string(),
                cell: c.index,
                expected: "number",
            });
        }

        let buffers: Vec<Vec<(usize, f64)>> = seeds
            .par_iter()
            .map(|&(source, seed)| self.spread(source, seed, steps, decay))
            .collect();

        let mut total = vec![0.0f64; self.len()];
        for buf in &buffers {
            for &(i, v) in buf {
                total[i] += v;
            }
        }
        for cell in self.cells_mut() {
            cell.set(attribute, AttrValue::Number(total[cell.index]));
        }

        info!(
            attribute,
            sources = seeds.len(),
            steps,
            decay = %decay,
            reached = buffers.iter().map(Vec::len).sum::<usize>(),
            "trickle down"
        );
        Ok(())
    }

    fn seeds(
        &self,
        sources: &[usize],
        attribute: &str,
        initial_value: Option<f64>,
    ) -> Result<Vec<(usize, f64)>> {
        sources
            .iter()
            .map(|&s| {
                self.check_index(s)?;
                let seed = match initial_value {
                    Some(v) => v,
                    None => match self.cells()[s].get(attribute) {
                        Some(AttrValue::Number(v)) => *v,
                        Some(AttrValue::Text(_)) => {
                            return Err(GridError::KindMismatch {
                                attribute: attribute.to_string(),
                                cell: s,
                                expected: "number",
                            });
                        }
                        None => {
                            return Err(GridError::MissingAttribute {
                                attribute: attribute.to_string(),
                                cell: s,
                            });
                        }
                    },
                };
                Ok((s, seed))
            })
            .collect()
    }

    /// BFS from one source. Unit edge cost means the first visit of a cell
    /// is along a shortest path; later, longer arrivals are dropped.
    fn spread(&self, source: usize, seed: f64, steps: u32, decay: DecayRule) -> Vec<(usize, f64)> {
        // cell -> (remaining steps at first visit, value)
        let mut visited: HashMap<usize, (u32, f64)> = HashMap::new();
        let mut queue = VecDeque::from([(source, steps, seed)]);

        while let Some((i, remaining, value)) = queue.pop_front() {
            if visited.get(&i).is_some_and(|&(r, _)| r >= remaining) {
                continue;
            }
            visited.insert(i, (remaining, value));

            if remaining > 0 {
                let next = decay.next(value, seed, steps);
                for j in self.neighbors(i) {
                    if !visited.contains_key(&j) {
                        queue.push_back((j, remaining - 1, next));
                    }
                }
            }
        }

        debug!(source, seed, reached = visited.len(), "spread");
        let mut out: Vec<(usize, f64)> = visited.into_iter().map(|(i, (_, v))| (i, v)).collect();
        out.sort_unstable_by_key(|&(i, _)| i);
        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::attr::ValueKind;
    use crate::config::{Boundary, GANGNAM_STATION, GridParams};
    use crate::coord::Direction;

    const CENTER: usize = 220;

    fn grid() -> GridIndex {
        GridIndex::new(&GridParams {
            start: GANGNAM_STATION,
            boundary: Boundary::uniform(1.0),
            cell_size_m: 100.0,
            name: "diffusion".into(),
        })
        .unwrap()
    }

    fn value(g: &GridIndex, i: usize, key: &str) -> f64 {
        g.cells()[i].get(key).and_then(AttrValue::as_number).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn seeded(values: &[(usize, f64)]) -> GridIndex {
        let mut g = grid();
        let map: HashMap<usize, AttrValue> =
            values.iter().map(|&(i, v)| (i, AttrValue::Number(v))).collect();
        g.push_attributes(&map, "amount", ValueKind::Number).unwrap();
        g
    }

    #[test]
    fn parses_descriptors() {
        assert_eq!("*0.8".parse::<DecayRule>().unwrap(), DecayRule::Multiply(0.8));
        assert_eq!("-5".parse::<DecayRule>().unwrap(), DecayRule::Subtract(5.0));
        assert_eq!("+2.5".parse::<DecayRule>().unwrap(), DecayRule::Add(2.5));
        assert_eq!("3".parse::<DecayRule>().unwrap(), DecayRule::Add(3.0));
        assert_eq!("Taper".parse::<DecayRule>().unwrap(), DecayRule::Taper);
        for bad in ["", "*", "half", "0.5x", "*0.5*", "nan", "*inf"] {
            assert!(
                matches!(bad.parse::<DecayRule>(), Err(GridError::InvalidDecay(_))),
                "{bad}"
            );
        }
        let r = DecayRule::Multiply(0.25);
        assert_eq!(r.to_string().parse::<DecayRule>().unwrap(), r);
    }

    #[test]
    fn zero_steps_keeps_only_sources() {
        let mut g = seeded(&[(CENTER, 100.0), (5, 7.0)]);
        g.trickle_down(&[CENTER, 5], 0, "amount", DecayRule::Multiply(0.5), None)
            .unwrap();
        for c in g.cells() {
            let want = match c.index {
                CENTER => 100.0,
                5 => 7.0,
                _ => 0.0,
            };
            assert!(close(value(&g, c.index, "amount"), want), "cell {}", c.index);
        }
    }

    #[test]
    fn multiplicative_decay_uses_shortest_hop_count() {
        let mut g = seeded(&[(CENTER, 80.0)]);
        g.trickle_down(&[CENTER], 2, "amount", DecayRule::Multiply(0.5), None)
            .unwrap();

        assert!(close(value(&g, CENTER, "amount"), 80.0));
        for d in Direction::ALL {
            let one = g.neighbor(CENTER, d).unwrap();
            assert!(close(value(&g, one, "amount"), 40.0));
            let two = g.neighbor(one, d).unwrap();
            assert!(close(value(&g, two, "amount"), 20.0));
        }
        // Knight's move: many 2-hop paths, still two hops.
        assert!(close(value(&g, CENTER - 21 * 2 + 1, "amount"), 20.0));
        // Three hops out is beyond the budget.
        assert!(close(value(&g, CENTER + 3, "amount"), 0.0));

        let reached = g.cells().iter().filter(|c| value(&g, c.index, "amount") > 0.0).count();
        assert_eq!(reached, 25);
    }

    #[test]
    fn overlapping_sources_add() {
        // 220 and 222 share the 1-hop neighbor 221.
        let mut g = seeded(&[(CENTER, 100.0), (CENTER + 2, 40.0)]);
        g.trickle_down(&[CENTER, CENTER + 2], 1, "amount", DecayRule::Multiply(0.5), None)
            .unwrap();
        assert!(close(value(&g, CENTER + 1, "amount"), 70.0));
        assert!(close(value(&g, CENTER, "amount"), 100.0));
        assert!(close(value(&g, CENTER + 2, "amount"), 40.0));
        assert!(close(value(&g, CENTER - 1, "amount"), 50.0));
        assert!(close(value(&g, CENTER + 3, "amount"), 20.0));
    }

    #[test]
    fn initial_value_overrides_cell_value() {
        let mut g = seeded(&[(CENTER, 100.0)]);
        g.trickle_down(&[CENTER], 1, "amount", DecayRule::Subtract(3.0), Some(10.0))
            .unwrap();
        assert!(close(value(&g, CENTER, "amount"), 10.0));
        assert!(close(value(&g, CENTER + 1, "amount"), 7.0));
    }

    #[test]
    fn initial_value_creates_attribute() {
        let mut g = grid();
        g.trickle_down(&[0], 1, "influence", DecayRule::Add(1.0), Some(2.0))
            .unwrap();
        assert!(close(value(&g, 0, "influence"), 2.0));
        assert!(close(value(&g, 1, "influence"), 3.0));
        assert!(close(value(&g, 22, "influence"), 3.0));
        assert!(close(value(&g, 440, "influence"), 0.0));
    }

    #[test]
    fn taper_reaches_zero_at_the_edge() {
        let mut g = seeded(&[(CENTER, 90.0)]);
        g.trickle_down(&[CENTER], 3, "amount", DecayRule::Taper, None)
            .unwrap();
        assert!(close(value(&g, CENTER + 1, "amount"), 60.0));
        assert!(close(value(&g, CENTER + 2, "amount"), 30.0));
        assert!(close(value(&g, CENTER + 3, "amount"), 0.0));
    }

    #[test]
    fn corner_source_is_clipped() {
        let mut g = seeded(&[(0, 8.0)]);
        g.trickle_down(&[0], 1, "amount", DecayRule::Multiply(0.5), None)
            .unwrap();
        let reached: Vec<usize> = g
            .cells()
            .iter()
            .filter(|c| value(&g, c.index, "amount") > 0.0)
            .map(|c| c.index)
            .collect();
        assert_eq!(reached, vec![0, 1, 21, 22]);
    }

    #[test]
    fn result_overwrites_previous_values() {
        let mut g = seeded(&[(CENTER, 10.0), (0, 99.0)]);
        g.trickle_down(&[CENTER], 1, "amount", DecayRule::Multiply(0.5), None)
            .unwrap();
        // Cell 0 was not a source and is out of reach.
        assert!(close(value(&g, 0, "amount"), 0.0));
    }

    #[test]
    fn rejects_bad_sources_before_writing() {
        let mut g = grid();
        let err = g
            .trickle_down(&[CENTER], 1, "amount", DecayRule::Multiply(0.5), None)
            .unwrap_err();
        assert_eq!(err, GridError::MissingAttribute { attribute: "amount".into(), cell: CENTER });

        let err = g
            .trickle_down(&[100_000], 1, "amount", DecayRule::Multiply(0.5), Some(1.0))
            .unwrap_err();
        assert!(matches!(err, GridError::CellOutOfRange { .. }));
        assert!(g.cells().iter().all(|c| c.get("amount").is_none()));

        g.push_attributes(&HashMap::new(), "name", ValueKind::Text).unwrap();
        let err = g
            .trickle_down(&[CENTER], 1, "name", DecayRule::Multiply(0.5), Some(1.0))
            .unwrap_err();
        assert!(matches!(err, GridError::KindMismatch { .. }));
    }
}
