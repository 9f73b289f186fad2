use crate::gas_price::GasPriceConfig;
use cinder_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

/// Coordinator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// The peer network this node participates in.
    pub network_id: u64,
    /// JSON-RPC endpoint bad-block reports are submitted to.
    pub sentinel_url: Option<String>,
    /// Prepare mining work even when no transactions are pending.
    pub force_mining: bool,
    /// Keep mining even when the canary signals a bad chain.
    pub mine_on_bad_chain: bool,
    /// Prefer GPU workers over CPU workers.
    pub turbo_mining: bool,
    /// Beneficiary of sealed blocks.
    pub miner_address: Address,
    /// Miner-supplied extra data for sealed headers, at most 32 bytes.
    pub extra_data: Bytes,
    /// Gas price estimator settings.
    pub gas_price: GasPriceConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            network_id: 1,
            sentinel_url: None,
            force_mining: false,
            mine_on_bad_chain: false,
            turbo_mining: false,
            miner_address: Address::ZERO,
            extra_data: Bytes::new(),
            gas_price: GasPriceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_config() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"networkId": 5, "forceMining": true}"#).unwrap();
        assert_eq!(config.network_id, 5);
        assert!(config.force_mining);
        assert!(!config.turbo_mining);
        assert_eq!(config.gas_price, GasPriceConfig::default());
    }
}
