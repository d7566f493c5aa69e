// Pathfinding across AMM pools and order-book offers
// Builds a directed graph over canonical asset strings from an immutable
// snapshot and runs Dijkstra with a fee-derived edge cost. The graph
// references pools and offers by index into the snapshot; nothing is shared
// or mutated after construction, so a pathfinder is safe to use from any
// number of threads.

use crate::errors::RouterError;
use crate::types::{AmmPool, Asset, Hop, HopKind, Offer, Route};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Maximum number of hops in a route.
pub const MAX_HOPS: usize = 3;

pub struct Pathfinder {
    pools: Vec<AmmPool>,
    offers: Vec<Offer>,
}

/// Which snapshot entry an edge came from.
#[derive(Debug, Clone, Copy)]
enum EdgeSource {
    Pool(usize),
    Offer(usize),
}

struct Edge {
    to: String,
    weight: Decimal,
    source: EdgeSource,
}

/// Heap entry ordered by ascending cost, ties broken by insertion order so
/// the search is stable across runs.
struct HeapEntry {
    cost: Decimal,
    seq: u64,
    asset: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the cheapest, earliest-pushed
        // entry pops first.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl Pathfinder {
    /// Take ownership of a snapshot. The pools and offers are immutable for
    /// the life of this pathfinder; refreshing the snapshot means building a
    /// new one.
    pub fn new(pools: Vec<AmmPool>, offers: Vec<Offer>) -> Self {
        Self { pools, offers }
    }

    pub fn pools(&self) -> &[AmmPool] {
        &self.pools
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn find_best_route(
        &self,
        input: &Asset,
        output: &Asset,
        amount: Decimal,
    ) -> Result<Route, RouterError> {
        let graph = self.build_graph();

        let (path, edges) = self
            .dijkstra(&graph, &input.canonical(), &output.canonical())
            .ok_or(RouterError::NoRoute)?;

        if path.len() > MAX_HOPS + 1 {
            return Err(RouterError::NoRoute);
        }

        self.build_route(&path, &edges, amount)
            .ok_or(RouterError::InsufficientLiquidity)
    }

    fn build_graph(&self) -> HashMap<String, Vec<Edge>> {
        let mut graph: HashMap<String, Vec<Edge>> = HashMap::new();

        for (i, pool) in self.pools.iter().enumerate() {
            let asset1 = pool.asset1.canonical();
            let asset2 = pool.asset2.canonical();
            let weight = fee_multiplier(pool.trading_fee_bps);

            graph.entry(asset1.clone()).or_default().push(Edge {
                to: asset2.clone(),
                weight,
                source: EdgeSource::Pool(i),
            });
            graph.entry(asset2).or_default().push(Edge {
                to: asset1,
                weight,
                source: EdgeSource::Pool(i),
            });
        }

        for (i, offer) in self.offers.iter().enumerate() {
            graph
                .entry(offer.taker_pays.canonical())
                .or_default()
                .push(Edge {
                    to: offer.taker_gets.canonical(),
                    weight: offer.quality,
                    source: EdgeSource::Offer(i),
                });
        }

        graph
    }

    /// Standard Dijkstra over additive edge cost `1 - weight`. Returns the
    /// node sequence from `start` to `end` and, per reached node, the edge
    /// that relaxed it.
    fn dijkstra(
        &self,
        graph: &HashMap<String, Vec<Edge>>,
        start: &str,
        end: &str,
    ) -> Option<(Vec<String>, HashMap<String, EdgeSource>)> {
        // Every observed node gets a distance up front: adjacency keys, all
        // edge targets, and the source itself.
        let mut dist: HashMap<String, Decimal> = HashMap::new();
        for (node, edges) in graph {
            dist.insert(node.clone(), Decimal::MAX);
            for edge in edges {
                dist.insert(edge.to.clone(), Decimal::MAX);
            }
        }
        dist.insert(start.to_string(), Decimal::ZERO);

        let mut prev: HashMap<String, String> = HashMap::new();
        let mut prev_edge: HashMap<String, EdgeSource> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();

        let mut seq = 0u64;
        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            cost: Decimal::ZERO,
            seq,
            asset: start.to_string(),
        });

        while let Some(current) = heap.pop() {
            if !visited.insert(current.asset.clone()) {
                continue;
            }

            if current.asset == end {
                break;
            }

            let Some(edges) = graph.get(&current.asset) else {
                continue;
            };
            for edge in edges {
                if visited.contains(&edge.to) {
                    continue;
                }

                let new_cost = current.cost + (Decimal::ONE - edge.weight);
                if new_cost < dist[&edge.to] {
                    dist.insert(edge.to.clone(), new_cost);
                    prev.insert(edge.to.clone(), current.asset.clone());
                    prev_edge.insert(edge.to.clone(), edge.source);
                    seq += 1;
                    heap.push(HeapEntry {
                        cost: new_cost,
                        seq,
                        asset: edge.to.clone(),
                    });
                }
            }
        }

        if !prev.contains_key(end) && start != end {
            return None;
        }

        let mut path = vec![end.to_string()];
        let mut at = end;
        while at != start {
            match prev.get(at) {
                Some(p) => {
                    path.push(p.clone());
                    at = p;
                }
                None => break,
            }
        }
        path.reverse();

        Some((path, prev_edge))
    }

    /// Walk the node sequence and compute hop amounts, each hop's output
    /// feeding the next hop's input. A missing or mismatched edge should not
    /// occur for a path the search produced, but is treated as a liquidity
    /// failure rather than a panic.
    fn build_route(
        &self,
        path: &[String],
        edges: &HashMap<String, EdgeSource>,
        amount: Decimal,
    ) -> Option<Route> {
        if path.len() < 2 {
            return None;
        }

        let mut hops = Vec::with_capacity(path.len() - 1);
        let mut current_amount = amount;

        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let hop = self.materialize_hop(*edges.get(to)?, from, to, current_amount)?;
            current_amount = hop.amount_out;
            hops.push(hop);
        }

        Some(Route {
            hops,
            price_impact: Decimal::ZERO,
        })
    }

    fn materialize_hop(
        &self,
        source: EdgeSource,
        from: &str,
        to: &str,
        amount_in: Decimal,
    ) -> Option<Hop> {
        match source {
            EdgeSource::Pool(i) => {
                let pool = self.pools.get(i)?;
                let (in_asset, out_asset, forward) = if pool.asset1.canonical() == from
                    && pool.asset2.canonical() == to
                {
                    (pool.asset1.clone(), pool.asset2.clone(), true)
                } else if pool.asset2.canonical() == from && pool.asset1.canonical() == to {
                    (pool.asset2.clone(), pool.asset1.clone(), false)
                } else {
                    return None;
                };

                Some(Hop {
                    kind: HopKind::Amm,
                    in_asset,
                    out_asset,
                    amount_in,
                    amount_out: amm_output(pool, amount_in, forward),
                })
            }
            EdgeSource::Offer(i) => {
                let offer = self.offers.get(i)?;
                if offer.taker_pays.canonical() != from || offer.taker_gets.canonical() != to {
                    return None;
                }

                Some(Hop {
                    kind: HopKind::Orderbook,
                    in_asset: offer.taker_pays.clone(),
                    out_asset: offer.taker_gets.clone(),
                    amount_in,
                    amount_out: amount_in * offer.quality,
                })
            }
        }
    }
}

fn fee_multiplier(fee_bps: u32) -> Decimal {
    Decimal::ONE - Decimal::from(fee_bps) / Decimal::from(10_000u32)
}

/// Constant-product output with the pool fee deducted from the input:
/// `x' = x * (1 - fee)`, `y = x' * R_out / (R_in + x')`. Reserves are not
/// mutated; quotes do not commit.
pub fn amm_output(pool: &AmmPool, amount_in: Decimal, asset1_to_asset2: bool) -> Decimal {
    let (reserve_in, reserve_out) = if asset1_to_asset2 {
        (pool.asset1_reserve, pool.asset2_reserve)
    } else {
        (pool.asset2_reserve, pool.asset1_reserve)
    };

    let amount_after_fee = amount_in * fee_multiplier(pool.trading_fee_bps);
    (amount_after_fee * reserve_out) / (reserve_in + amount_after_fee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ISSUER_A: &str = "rvYAfWj5gh67oV6fW32ZzP3Aw4Eubs59B";
    const ISSUER_B: &str = "rhub8VRN55s94qWKDv6jmDy1pUykJzF3wq";
    const ISSUER_C: &str = "rN7n7otQDd6FczFgLdSqtcsAUxDkw6fzRH";
    const ISSUER_D: &str = "rLHzPsX6oXkzU9rFxyZMSbF4ApdQnXPZy4";

    fn pool(
        asset1: Asset,
        asset2: Asset,
        reserve1: Decimal,
        reserve2: Decimal,
        fee_bps: u32,
    ) -> AmmPool {
        AmmPool {
            asset1,
            asset2,
            asset1_reserve: reserve1,
            asset2_reserve: reserve2,
            trading_fee_bps: fee_bps,
        }
    }

    #[test]
    fn direct_amm_route() {
        let pf = Pathfinder::new(
            vec![pool(
                Asset::native(),
                Asset::issued("USD", ISSUER_A),
                dec!(10000),
                dec!(15000),
                30,
            )],
            vec![],
        );

        let route = pf
            .find_best_route(&Asset::native(), &Asset::issued("USD", ISSUER_A), dec!(100))
            .expect("route");

        assert_eq!(route.hops.len(), 1);
        assert_eq!(route.hops[0].kind, HopKind::Amm);
        // (100 * 0.997 * 15000) / (10000 + 100 * 0.997) ~= 148.07
        let out = route.hops[0].amount_out;
        assert!(out > dec!(148.0) && out < dec!(148.2), "amount_out {out}");
    }

    #[test]
    fn direct_orderbook_route() {
        let pf = Pathfinder::new(
            vec![],
            vec![Offer {
                taker_pays: Asset::native(),
                taker_gets: Asset::issued("USD", ISSUER_A),
                quality: dec!(1.5),
            }],
        );

        let route = pf
            .find_best_route(&Asset::native(), &Asset::issued("USD", ISSUER_A), dec!(100))
            .expect("route");

        assert_eq!(route.hops.len(), 1);
        assert_eq!(route.hops[0].kind, HopKind::Orderbook);
        assert_eq!(route.hops[0].amount_out, dec!(150.0));
    }

    #[test]
    fn two_hop_amm_route() {
        let btc = Asset::issued("BTC", ISSUER_A);
        let pf = Pathfinder::new(
            vec![
                pool(Asset::native(), btc.clone(), dec!(10000), dec!(100), 30),
                pool(
                    btc.clone(),
                    Asset::issued("USD", ISSUER_B),
                    dec!(100),
                    dec!(3000000),
                    30,
                ),
            ],
            vec![],
        );

        let route = pf
            .find_best_route(&Asset::native(), &Asset::issued("USD", ISSUER_B), dec!(100))
            .expect("route");

        assert_eq!(route.hops.len(), 2);
        assert_eq!(route.hops[0].out_asset, btc);
        assert_eq!(route.hops[1].in_asset, btc);
        assert_eq!(route.hops[0].amount_out, route.hops[1].amount_in);
    }

    #[test]
    fn no_route_to_unknown_asset() {
        let pf = Pathfinder::new(
            vec![pool(
                Asset::native(),
                Asset::issued("USD", ISSUER_A),
                dec!(10000),
                dec!(15000),
                30,
            )],
            vec![],
        );

        let err = pf
            .find_best_route(&Asset::native(), &Asset::issued("EUR", ISSUER_B), dec!(100))
            .unwrap_err();
        assert_eq!(err, RouterError::NoRoute);
    }

    #[test]
    fn hop_cap_rejects_long_chains() {
        let aaa = Asset::issued("AAA", ISSUER_A);
        let bbb = Asset::issued("BBB", ISSUER_A);
        let ccc = Asset::issued("CCC", ISSUER_B);
        let ddd = Asset::issued("DDD", ISSUER_C);
        let eee = Asset::issued("EEE", ISSUER_D);

        let pf = Pathfinder::new(
            vec![
                pool(aaa.clone(), bbb.clone(), dec!(1000), dec!(1000), 30),
                pool(bbb, ccc.clone(), dec!(1000), dec!(1000), 30),
                pool(ccc, ddd.clone(), dec!(1000), dec!(1000), 30),
                pool(ddd, eee.clone(), dec!(1000), dec!(1000), 30),
            ],
            vec![],
        );

        let err = pf.find_best_route(&aaa, &eee, dec!(10)).unwrap_err();
        assert_eq!(err, RouterError::NoRoute);
    }

    #[test]
    fn prefers_cheaper_fee() {
        let usd = Asset::issued("USD", ISSUER_A);
        // Two direct pools; the lower-fee one gives the cheaper edge.
        let pf = Pathfinder::new(
            vec![
                pool(Asset::native(), usd.clone(), dec!(10000), dec!(15000), 100),
                pool(Asset::native(), usd.clone(), dec!(10000), dec!(15000), 10),
            ],
            vec![],
        );

        let route = pf
            .find_best_route(&Asset::native(), &usd, dec!(100))
            .expect("route");
        assert_eq!(route.hops.len(), 1);
        // The 10 bps pool keeps more of the input.
        let out = route.hops[0].amount_out;
        assert!(out > dec!(148.2), "expected low-fee pool output, got {out}");
    }

    #[test]
    fn pool_traversal_is_bidirectional() {
        let usd = Asset::issued("USD", ISSUER_A);
        let pf = Pathfinder::new(
            vec![pool(
                Asset::native(),
                usd.clone(),
                dec!(10000),
                dec!(15000),
                30,
            )],
            vec![],
        );

        let route = pf
            .find_best_route(&usd, &Asset::native(), dec!(150))
            .expect("reverse route");
        assert_eq!(route.hops.len(), 1);
        assert_eq!(route.hops[0].in_asset, usd);
        assert_eq!(route.hops[0].out_asset, Asset::native());
    }

    #[test]
    fn offers_are_one_directional() {
        let usd = Asset::issued("USD", ISSUER_A);
        let pf = Pathfinder::new(
            vec![],
            vec![Offer {
                taker_pays: Asset::native(),
                taker_gets: usd.clone(),
                quality: dec!(1.5),
            }],
        );

        let err = pf
            .find_best_route(&usd, &Asset::native(), dec!(100))
            .unwrap_err();
        assert_eq!(err, RouterError::NoRoute);
    }

    #[test]
    fn amm_output_monotonic_in_input() {
        let p = pool(
            Asset::native(),
            Asset::issued("USD", ISSUER_A),
            dec!(10000),
            dec!(15000),
            30,
        );
        let small = amm_output(&p, dec!(100), true);
        let large = amm_output(&p, dec!(200), true);
        assert!(small > Decimal::ZERO);
        assert!(large > small);
        // Output is bounded by the output-side reserve.
        assert!(amm_output(&p, dec!(1000000000), true) < p.asset2_reserve);
    }
}
