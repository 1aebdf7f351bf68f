//! JSON-RPC `eth_call` client for the pool query contract.

use super::chain::{ChainQuery, ChainQueryError, KnockoutLiq};
use crate::domain::{ChainId, EthAddress, KOClaimLocation, PositionLocation};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const RPC_TIMEOUT: Duration = Duration::from_secs(20);
const WORD: usize = 32;

const SEL_AMBIENT_TOKENS: [u8; 4] = [0xeb, 0xca, 0x95, 0xde];
const SEL_RANGE_TOKENS: [u8; 4] = [0xd7, 0xfd, 0x8d, 0x0f];
const SEL_CONC_REWARDS: [u8; 4] = [0x3d, 0xcc, 0xd7, 0xd7];
const SEL_KNOCKOUT_TOKENS: [u8; 4] = [0x93, 0xc3, 0x3a, 0x71];
const SEL_KNOCKOUT_PIVOT: [u8; 4] = [0x10, 0xfc, 0x74, 0xf4];

#[derive(Debug, Clone)]
struct RpcTarget {
    url: String,
    query_contract: EthAddress,
}

/// Chain query backed by each chain's RPC endpoint. Chains without an
/// endpoint answer zero.
#[derive(Debug, Clone)]
pub struct RpcChainQuery {
    client: Client,
    targets: HashMap<ChainId, RpcTarget>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

impl RpcChainQuery {
    pub fn new() -> Result<Self, ChainQueryError> {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ChainQueryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            targets: HashMap::new(),
        })
    }

    pub fn with_chain(mut self, chain_id: ChainId, url: String, query_contract: EthAddress) -> Self {
        self.targets.insert(chain_id, RpcTarget { url, query_contract });
        self
    }

    /// Returns `None` when the chain has no RPC endpoint.
    async fn eth_call(
        &self,
        chain_id: &ChainId,
        calldata: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, ChainQueryError> {
        let Some(target) = self.targets.get(chain_id) else {
            return Ok(None);
        };

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": target.query_contract.as_str(), "data": format!("0x{}", hex::encode(&calldata)) },
                "latest"
            ]
        });

        let response = self
            .client
            .post(&target.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainQueryError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChainQueryError::Transport(format!(
                "HTTP status {}",
                response.status().as_u16()
            )));
        }
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainQueryError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(ChainQueryError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = body
            .result
            .ok_or_else(|| ChainQueryError::Decode("missing result".to_string()))?;
        decode_hex(&result).map(Some)
    }

    async fn call_u128(
        &self,
        chain_id: &ChainId,
        calldata: Vec<u8>,
        word: usize,
    ) -> Result<u128, ChainQueryError> {
        match self.eth_call(chain_id, calldata).await? {
            Some(ret) => word_u128(&ret, word),
            None => Ok(0),
        }
    }
}

fn position_calldata(selector: [u8; 4], loc: &PositionLocation, with_ticks: bool) -> Result<Vec<u8>, ChainQueryError> {
    let mut data = selector.to_vec();
    data.extend(word_address(&loc.user)?);
    data.extend(word_address(&loc.pool.base)?);
    data.extend(word_address(&loc.pool.quote)?);
    data.extend(word_uint(loc.pool.pool_idx));
    if with_ticks {
        data.extend(word_int(loc.liq.bid_tick));
        data.extend(word_int(loc.liq.ask_tick));
    }
    Ok(data)
}

fn word_address(addr: &EthAddress) -> Result<[u8; WORD], ChainQueryError> {
    let raw = decode_hex(addr.as_str())?;
    if raw.len() != 20 {
        return Err(ChainQueryError::Decode(format!("bad address {}", addr)));
    }
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&raw);
    Ok(word)
}

fn word_uint(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Two's-complement, sign-extended across the whole word.
fn word_int(value: i32) -> [u8; WORD] {
    let fill = if value < 0 { 0xff } else { 0x00 };
    let mut word = [fill; WORD];
    word[28..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_bool(value: bool) -> [u8; WORD] {
    word_uint(u64::from(value))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ChainQueryError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| ChainQueryError::Decode(e.to_string()))
}

fn return_word(ret: &[u8], idx: usize) -> Result<&[u8], ChainQueryError> {
    ret.get(idx * WORD..(idx + 1) * WORD)
        .ok_or_else(|| ChainQueryError::Decode(format!("return data too short for word {}", idx)))
}

fn word_u128(ret: &[u8], idx: usize) -> Result<u128, ChainQueryError> {
    let word = return_word(ret, idx)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainQueryError::Decode(format!("word {} overflows u128", idx)));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn word_bool_at(ret: &[u8], idx: usize) -> Result<bool, ChainQueryError> {
    Ok(return_word(ret, idx)?.iter().any(|b| *b != 0))
}

#[async_trait]
impl ChainQuery for RpcChainQuery {
    async fn query_ambient_tokens(&self, loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        let data = position_calldata(SEL_AMBIENT_TOKENS, loc, false)?;
        self.call_u128(&loc.pool.chain_id, data, 0).await
    }

    async fn query_range_tokens(&self, loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        let data = position_calldata(SEL_RANGE_TOKENS, loc, true)?;
        self.call_u128(&loc.pool.chain_id, data, 0).await
    }

    async fn query_conc_rewards(&self, loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        let data = position_calldata(SEL_CONC_REWARDS, loc, true)?;
        self.call_u128(&loc.pool.chain_id, data, 0).await
    }

    async fn query_knockout_tokens(
        &self,
        loc: &KOClaimLocation,
    ) -> Result<KnockoutLiq, ChainQueryError> {
        let pos = &loc.pos;
        let mut data = SEL_KNOCKOUT_TOKENS.to_vec();
        data.extend(word_address(&pos.user)?);
        data.extend(word_address(&pos.pool.base)?);
        data.extend(word_address(&pos.pool.quote)?);
        data.extend(word_uint(pos.pool.pool_idx));
        data.extend(word_uint(loc.pivot_time.max(0) as u64));
        data.extend(word_bool(pos.liq.is_bid));
        data.extend(word_int(pos.liq.bid_tick));
        data.extend(word_int(pos.liq.ask_tick));

        debug!(user = %pos.user, pivot = loc.pivot_time, "queryKnockoutTokens");
        match self.eth_call(&pos.pool.chain_id, data).await? {
            Some(ret) => Ok(KnockoutLiq {
                liq: word_u128(&ret, 0)?,
                knocked_out: word_bool_at(&ret, 3)?,
            }),
            None => Ok(KnockoutLiq::default()),
        }
    }

    async fn query_knockout_pivot(&self, loc: &PositionLocation) -> Result<i64, ChainQueryError> {
        let mut data = SEL_KNOCKOUT_PIVOT.to_vec();
        data.extend(word_address(&loc.pool.base)?);
        data.extend(word_address(&loc.pool.quote)?);
        data.extend(word_uint(loc.pool.pool_idx));
        data.extend(word_bool(loc.liq.is_bid));
        data.extend(word_int(loc.liq.pivot_tick()));

        let pivot = self.call_u128(&loc.pool.chain_id, data, 1).await?;
        i64::try_from(pivot).map_err(|_| ChainQueryError::Decode("pivot overflows i64".to_string()))
    }
}
