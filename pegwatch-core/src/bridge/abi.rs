//! Bridge contract ABI.
//!
//! Only the methods used for filtering and the events consumed by the
//! status processors are declared.

use super::{BridgeEvent, BridgeMethod, DecodeError};
use crate::node::Log;
use alloy_primitives::{Address, B256, Bytes, FixedBytes};
use alloy_sol_types::{SolCall, SolEvent, sol};

sol! {
    function registerBtcTransaction(bytes tx, int256 height, bytes pmt);
    function updateCollections();
    function addSignature(bytes pubkey, bytes[] signatures, bytes txhash);
    function receiveHeaders(bytes[] blocks);

    event lock_btc(address indexed receiver, bytes32 indexed btcTxHash, string senderBtcAddress, int256 amount);
    event pegin_btc(address indexed receiver, bytes32 indexed btcTxHash, int256 amount, int256 protocolVersion);
    event rejected_pegin(bytes32 indexed btcTxHash, int256 reason);
    event unrefundable_pegin(bytes32 indexed btcTxHash, int256 reason);
    event release_requested(bytes32 indexed rskTxHash, bytes32 indexed btcTxHash, uint256 amount);
    event release_request_received(address indexed sender, string btcDestinationAddress, uint256 amount);
    event release_request_rejected(address indexed sender, uint256 amount, int256 reason);
    event batch_pegout_created(bytes32 indexed btcTxHash, bytes releaseRskTxHashes);
    event pegout_confirmed(bytes32 indexed btcTxHash, uint256 pegoutCreationRskBlockNumber);
    event update_collections(address indexed sender);
    event add_signature(bytes32 indexed releaseRskTxHash, address indexed federatorRskAddress, bytes federatorBtcPublicKey);
    event release_btc(bytes32 indexed releaseRskTxHash, bytes btcRawTransaction);
}

impl BridgeMethod {
    pub const ALL: [BridgeMethod; 4] = [
        BridgeMethod::RegisterBtcTransaction,
        BridgeMethod::UpdateCollections,
        BridgeMethod::AddSignature,
        BridgeMethod::ReceiveHeaders,
    ];

    /// 4-byte function selector.
    pub fn selector(self) -> [u8; 4] {
        match self {
            BridgeMethod::RegisterBtcTransaction => registerBtcTransactionCall::SELECTOR,
            BridgeMethod::UpdateCollections => updateCollectionsCall::SELECTOR,
            BridgeMethod::AddSignature => addSignatureCall::SELECTOR,
            BridgeMethod::ReceiveHeaders => receiveHeadersCall::SELECTOR,
        }
    }

    /// Canonical Solidity signature, e.g. `updateCollections()`.
    pub fn signature(self) -> &'static str {
        match self {
            BridgeMethod::RegisterBtcTransaction => registerBtcTransactionCall::SIGNATURE,
            BridgeMethod::UpdateCollections => updateCollectionsCall::SIGNATURE,
            BridgeMethod::AddSignature => addSignatureCall::SIGNATURE,
            BridgeMethod::ReceiveHeaders => receiveHeadersCall::SIGNATURE,
        }
    }

    /// Whether hex call data starts with this method's selector.
    pub fn matches(self, call_data: &str) -> bool {
        let data = call_data.strip_prefix("0x").unwrap_or(call_data);
        data.get(..8)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&hex::encode(self.selector())))
    }

    /// Identify the bridge method invoked by hex call data.
    pub fn from_call_data(call_data: &str) -> Option<BridgeMethod> {
        Self::ALL.into_iter().find(|method| method.matches(call_data))
    }
}

/// Decode a single log emitted by the bridge.
///
/// Returns `Ok(None)` for events this service does not consume.
pub fn decode_log(log: &Log) -> Result<Option<BridgeEvent>, DecodeError> {
    let topics = log
        .topics
        .iter()
        .map(|topic| topic.parse::<B256>().map_err(|_| DecodeError::InvalidHex(topic.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(signature) = topics.first().copied() else {
        return Ok(None);
    };
    let data = decode_hex(&log.data)?;
    let topics = topics.iter().copied();

    let event = if signature == lock_btc::SIGNATURE_HASH {
        let event = lock_btc::decode_raw_log(topics, &data)?;
        BridgeEvent::LockBtc {
            receiver: address_hex(&event.receiver),
            btc_tx_hash: word_hex(&event.btcTxHash),
            sender_btc_address: event.senderBtcAddress,
            amount: satoshis(event.amount)?,
        }
    } else if signature == pegin_btc::SIGNATURE_HASH {
        let event = pegin_btc::decode_raw_log(topics, &data)?;
        BridgeEvent::PeginBtc {
            receiver: address_hex(&event.receiver),
            btc_tx_hash: word_hex(&event.btcTxHash),
            amount: satoshis(event.amount)?,
            protocol_version: event.protocolVersion.to_string(),
        }
    } else if signature == rejected_pegin::SIGNATURE_HASH {
        let event = rejected_pegin::decode_raw_log(topics, &data)?;
        BridgeEvent::RejectedPegin {
            btc_tx_hash: word_hex(&event.btcTxHash),
            reason: event.reason.to_string(),
        }
    } else if signature == unrefundable_pegin::SIGNATURE_HASH {
        let event = unrefundable_pegin::decode_raw_log(topics, &data)?;
        BridgeEvent::UnrefundablePegin {
            btc_tx_hash: word_hex(&event.btcTxHash),
            reason: event.reason.to_string(),
        }
    } else if signature == release_requested::SIGNATURE_HASH {
        let event = release_requested::decode_raw_log(topics, &data)?;
        BridgeEvent::ReleaseRequested {
            rsk_tx_hash: prefixed_word_hex(&event.rskTxHash),
            btc_tx_hash: word_hex(&event.btcTxHash),
            amount: satoshis(event.amount)?,
        }
    } else if signature == release_request_received::SIGNATURE_HASH {
        let event = release_request_received::decode_raw_log(topics, &data)?;
        BridgeEvent::ReleaseRequestReceived {
            sender: address_hex(&event.sender),
            btc_destination_address: event.btcDestinationAddress,
            amount: satoshis(event.amount)?,
        }
    } else if signature == release_request_rejected::SIGNATURE_HASH {
        let event = release_request_rejected::decode_raw_log(topics, &data)?;
        BridgeEvent::ReleaseRequestRejected {
            sender: address_hex(&event.sender),
            amount: satoshis(event.amount)?,
            reason: event.reason.to_string(),
        }
    } else if signature == batch_pegout_created::SIGNATURE_HASH {
        let event = batch_pegout_created::decode_raw_log(topics, &data)?;
        BridgeEvent::BatchPegoutCreated {
            btc_tx_hash: word_hex(&event.btcTxHash),
            release_rsk_tx_hashes: split_hashes(&event.releaseRskTxHashes)?,
        }
    } else if signature == pegout_confirmed::SIGNATURE_HASH {
        let event = pegout_confirmed::decode_raw_log(topics, &data)?;
        BridgeEvent::PegoutConfirmed {
            btc_tx_hash: word_hex(&event.btcTxHash),
            pegout_creation_rsk_block_number: satoshis(event.pegoutCreationRskBlockNumber)?,
        }
    } else if signature == update_collections::SIGNATURE_HASH {
        let event = update_collections::decode_raw_log(topics, &data)?;
        BridgeEvent::UpdateCollections {
            sender: address_hex(&event.sender),
        }
    } else if signature == add_signature::SIGNATURE_HASH {
        let event = add_signature::decode_raw_log(topics, &data)?;
        BridgeEvent::AddSignature {
            release_rsk_tx_hash: prefixed_word_hex(&event.releaseRskTxHash),
            federator_rsk_address: address_hex(&event.federatorRskAddress),
        }
    } else if signature == release_btc::SIGNATURE_HASH {
        let event = release_btc::decode_raw_log(topics, &data)?;
        BridgeEvent::ReleaseBtc {
            release_rsk_tx_hash: prefixed_word_hex(&event.releaseRskTxHash),
            btc_raw_transaction: hex::encode(&event.btcRawTransaction[..]),
        }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|_| DecodeError::InvalidHex(value.to_string()))
}

fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Bitcoin transaction ids are kept without prefix.
fn word_hex(word: &FixedBytes<32>) -> String {
    hex::encode(word.as_slice())
}

/// Ledger transaction hashes keep the `0x` prefix the node uses.
fn prefixed_word_hex(word: &FixedBytes<32>) -> String {
    format!("0x{}", word_hex(word))
}

/// Amounts and heights arrive as 256-bit integers; only the `i64` range is
/// meaningful for satoshi values and block numbers.
fn satoshis(value: impl ToString) -> Result<i64, DecodeError> {
    let value = value.to_string();
    value.parse().map_err(|_| DecodeError::OutOfRange(value))
}

/// `batch_pegout_created` packs the released transaction hashes as
/// consecutive 32-byte words.
fn split_hashes(packed: &Bytes) -> Result<Vec<String>, DecodeError> {
    if packed.len() % 32 != 0 {
        return Err(DecodeError::InvalidLength(packed.len()));
    }
    Ok(packed
        .chunks(32)
        .map(|chunk| format!("0x{}", hex::encode(chunk)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{I256, U256};

    fn log_from(address: &str, log: alloy_primitives::LogData) -> Log {
        Log {
            address: address.to_string(),
            topics: log
                .topics()
                .iter()
                .map(|topic| format!("0x{}", hex::encode(topic.as_slice())))
                .collect(),
            data: format!("0x{}", hex::encode(&log.data[..])),
        }
    }

    #[test]
    fn test_method_from_call_data() {
        let data = format!("0x{}", hex::encode(updateCollectionsCall::SELECTOR));
        assert_eq!(BridgeMethod::from_call_data(&data), Some(BridgeMethod::UpdateCollections));
        assert_eq!(BridgeMethod::from_call_data("0x"), None);
        assert_eq!(BridgeMethod::from_call_data("0xdeadbeef00"), None);
        assert_eq!(BridgeMethod::UpdateCollections.signature(), "updateCollections()");
    }

    #[test]
    fn test_decode_pegin_btc() {
        let receiver = Address::repeat_byte(0xab);
        let event = pegin_btc {
            receiver,
            btcTxHash: B256::repeat_byte(0x11),
            amount: I256::from_raw(U256::from(50_000u64)),
            protocolVersion: I256::from_raw(U256::from(1u64)),
        };
        let log = log_from("0x0000000000000000000000000000000001000006", event.encode_log_data());

        let decoded = decode_log(&log).unwrap().unwrap();
        assert_eq!(
            decoded,
            BridgeEvent::PeginBtc {
                receiver: format!("0x{}", "ab".repeat(20)),
                btc_tx_hash: "11".repeat(32),
                amount: 50_000,
                protocol_version: "1".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_batch_pegout_created() {
        let mut packed = vec![0x01u8; 32];
        packed.extend_from_slice(&[0x02u8; 32]);
        let event = batch_pegout_created {
            btcTxHash: B256::repeat_byte(0x33),
            releaseRskTxHashes: Bytes::from(packed),
        };
        let log = log_from("0x0000000000000000000000000000000001000006", event.encode_log_data());

        let Some(BridgeEvent::BatchPegoutCreated { release_rsk_tx_hashes, .. }) =
            decode_log(&log).unwrap()
        else {
            panic!("expected batch_pegout_created");
        };
        assert_eq!(
            release_rsk_tx_hashes,
            vec![format!("0x{}", "01".repeat(32)), format!("0x{}", "02".repeat(32))]
        );
    }

    #[test]
    fn test_decode_release_request_received() {
        let event = release_request_received {
            sender: Address::repeat_byte(0x01),
            btcDestinationAddress: "mzMCEHDUAZaKL9BXt9SzasFPUUqM77TqP1".to_string(),
            amount: U256::from(1_000_000u64),
        };
        let log = log_from("0x0000000000000000000000000000000001000006", event.encode_log_data());

        let Some(BridgeEvent::ReleaseRequestReceived { amount, btc_destination_address, .. }) =
            decode_log(&log).unwrap()
        else {
            panic!("expected release_request_received");
        };
        assert_eq!(amount, 1_000_000);
        assert_eq!(btc_destination_address, "mzMCEHDUAZaKL9BXt9SzasFPUUqM77TqP1");
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let log = Log {
            address: "0x0000000000000000000000000000000001000006".to_string(),
            topics: vec![format!("0x{}", "ff".repeat(32))],
            data: "0x".to_string(),
        };
        assert_eq!(decode_log(&log).unwrap(), None);
    }

    #[test]
    fn test_split_hashes_rejects_partial_word() {
        assert!(split_hashes(&Bytes::from(vec![0u8; 33])).is_err());
    }
}
