//! Gas price estimation from recent block history.
//!
//! The octile pricer folds every `(gas_price, gas_used)` pair of the last
//! thousand blocks into a weighted distribution and fits a normal curve to
//! it; the nine octiles of that fit are what `ask` and `bid` quote from.

use cinder_interfaces::Blockchain;
use cinder_primitives::{
    constants::{EMPTY_LIST_ROOT, GWEI_TO_WEI},
    U256,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Settings for the octile gas pricer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GasPriceConfig {
    /// How many recent blocks feed the distribution.
    pub blocks: usize,
    /// The octile quoted to sellers (what a miner should ask).
    pub ask_octile: usize,
    /// The octile quoted to buyers (what a sender should bid).
    pub bid_octile: usize,
    /// The price quoted before any history has been observed.
    pub default_price: U256,
}

impl Default for GasPriceConfig {
    fn default() -> Self {
        GasPriceConfig {
            blocks: 1000,
            ask_octile: 6,
            bid_octile: 2,
            default_price: U256::from(10 * GWEI_TO_WEI),
        }
    }
}

/// Recommends gas prices.
pub trait GasPricer: Send + Sync {
    /// Refreshes the recommendation from recent chain history.
    fn update(&mut self, chain: &dyn Blockchain);

    /// The price a block producer should require.
    fn ask(&self) -> U256;

    /// The price a transaction sender should offer.
    fn bid(&self) -> U256;
}

/// A pricer that quotes fixed values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrivialGasPricer {
    ask: U256,
    bid: U256,
}

impl TrivialGasPricer {
    /// Creates a pricer quoting `price` for both sides.
    pub fn new(price: U256) -> Self {
        TrivialGasPricer { ask: price, bid: price }
    }
}

impl Default for TrivialGasPricer {
    fn default() -> Self {
        Self::new(U256::from(10 * GWEI_TO_WEI))
    }
}

impl GasPricer for TrivialGasPricer {
    fn update(&mut self, _chain: &dyn Blockchain) {}

    fn ask(&self) -> U256 {
        self.ask
    }

    fn bid(&self) -> U256 {
        self.bid
    }
}

/// A pricer fitting recent history into nine monotone octiles.
#[derive(Clone, Debug)]
pub struct OctileGasPricer {
    config: GasPriceConfig,
    octiles: [U256; 9],
}

impl OctileGasPricer {
    /// Creates a pricer that quotes the configured default until updated.
    pub fn new(config: GasPriceConfig) -> Self {
        let octiles = [config.default_price; 9];
        OctileGasPricer { config, octiles }
    }

    /// The current octiles, lowest first.
    pub fn octiles(&self) -> &[U256; 9] {
        &self.octiles
    }
}

impl GasPricer for OctileGasPricer {
    fn update(&mut self, chain: &dyn Blockchain) {
        let mut distribution: BTreeMap<u128, u128> = BTreeMap::new();
        let mut scanned = 0usize;
        let mut cursor = chain.current_hash();

        while scanned < self.config.blocks && !cursor.is_zero() {
            let Some(info) = chain.block_info(cursor) else { break };
            if info.transactions_root != EMPTY_LIST_ROOT {
                if let (Some(transactions), Some(receipts)) =
                    (chain.transactions(cursor), chain.receipts(cursor))
                {
                    for (tx, receipt) in transactions.iter().zip(receipts.iter()) {
                        *distribution.entry(tx.gas_price).or_default() +=
                            receipt.gas_used as u128;
                    }
                }
            }
            cursor = info.parent_hash;
            scanned += 1;
        }

        if let Some(octiles) = octiles_from_distribution(&distribution) {
            self.octiles = octiles;
            trace!(target: "client::gas", scanned, low = %self.octiles[0], high = %self.octiles[8], "updated gas price octiles");
        }
    }

    fn ask(&self) -> U256 {
        self.octiles[self.config.ask_octile.min(8)]
    }

    fn bid(&self) -> U256 {
        self.octiles[self.config.bid_octile.min(8)]
    }
}

/// Computes the nine octiles of a gas-used-weighted price distribution.
///
/// Returns `None` for an empty distribution. The result is clamped to be
/// monotonically non-decreasing: with a tight distribution the observed
/// minimum flank can otherwise exceed the first fitted octile.
pub(crate) fn octiles_from_distribution(
    distribution: &BTreeMap<u128, u128>,
) -> Option<[U256; 9]> {
    let total: u128 = distribution.values().sum();
    if total == 0 {
        return None
    }

    let mut weighted_sum = U256::ZERO;
    for (price, weight) in distribution {
        weighted_sum += U256::from(*price) * U256::from(*weight);
    }
    let mean = weighted_sum / U256::from(total);
    // the mean never exceeds the largest observed price, so this cannot wrap
    let mean_f = mean.to::<u128>() as f64;

    let mut variance = 0f64;
    for (price, weight) in distribution {
        let delta = *price as f64 - mean_f;
        variance += *weight as f64 * delta * delta;
    }
    variance /= total as f64;

    let mut octiles = [U256::ZERO; 9];
    if variance > 0.0 {
        let normalized_sd = (variance.sqrt() / mean_f).max(0.01);
        octiles[0] = U256::from(*distribution.keys().next().expect("non-empty"));
        for (k, octile) in octiles.iter_mut().enumerate().take(8).skip(1) {
            let quantile = 1.0 + normalized_sd * probit(k as f64 / 8.0);
            *octile = U256::from((mean_f * quantile).max(0.0) as u128);
        }
        octiles[8] = U256::from(*distribution.keys().next_back().expect("non-empty"));
    } else {
        for (k, octile) in octiles.iter_mut().enumerate() {
            *octile = U256::from(k as u64 + 1) * mean / U256::from(5u64);
        }
    }

    // enforce monotonicity
    for k in 1..9 {
        if octiles[k] < octiles[k - 1] {
            octiles[k] = octiles[k - 1];
        }
    }
    Some(octiles)
}

/// The quantile function of the standard normal distribution, via Acklam's
/// rational approximation (relative error below 1.15e-9 over (0, 1)).
fn probit(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    debug_assert!(p > 0.0 && p < 1.0);

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5]) /
            ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q /
            (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5]) /
            ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
