//! Bitcoin raw transaction helpers.

use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BtcTxError {
    #[error("invalid raw transaction hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid raw transaction: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),
}

/// Parse a hex encoded, consensus serialized transaction.
pub fn parse_raw_transaction(raw: &str) -> Result<Transaction, BtcTxError> {
    let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))?;
    Ok(bitcoin::consensus::deserialize(&bytes)?)
}

/// Transaction id in the usual display order.
pub fn txid(tx: &Transaction) -> String {
    tx.compute_txid().to_string()
}

/// Fingerprint of the outpoints a transaction spends.
///
/// Signing does not change the inputs' previous outputs, so the unsigned
/// transaction held by the bridge and the signed one released later share
/// the same fingerprint.
pub fn inputs_fingerprint(tx: &Transaction) -> String {
    let mut context = ring::digest::Context::new(&ring::digest::SHA256);
    for input in &tx.input {
        context.update(input.previous_output.txid.as_byte_array());
    }
    hex::encode(context.finish().as_ref())
}

/// Total value, in satoshis, paid to `address` on `network`.
///
/// Outputs are matched by script, so any valid spelling of the address
/// (e.g. upper-case bech32) is accepted. Returns `None` when the address is
/// invalid for `network` or no output pays it.
pub fn value_paid_to(tx: &Transaction, address: &str, network: Network) -> Option<i64> {
    let recipient = address
        .parse::<Address<NetworkUnchecked>>()
        .ok()?
        .require_network(network)
        .ok()?
        .script_pubkey();
    let mut total: Option<i64> = None;
    for output in tx.output.iter().filter(|output| output.script_pubkey == recipient) {
        let value = i64::try_from(output.value.to_sat()).ok()?;
        total = Some(total.unwrap_or(0).checked_add(value)?);
    }
    total
}

/// Value, in satoshis, of the output at `index`.
pub fn output_value(tx: &Transaction, index: usize) -> Option<i64> {
    tx.output
        .get(index)
        .and_then(|output| i64::try_from(output.value.to_sat()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{
        Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, TxIn, TxOut, Txid, WPubkeyHash, Witness,
    };

    fn address(byte: u8) -> Address {
        Address::p2pkh(PubkeyHash::from_byte_array([byte; 20]), Network::Testnet)
    }

    fn transaction(script_sig: ScriptBuf) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![
                TxIn {
                    previous_output: OutPoint::new(Txid::from_byte_array([1; 32]), 0),
                    script_sig: script_sig.clone(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                },
                TxIn {
                    previous_output: OutPoint::new(Txid::from_byte_array([2; 32]), 1),
                    script_sig,
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                },
            ],
            output: vec![
                TxOut {
                    value: Amount::from_sat(9_000),
                    script_pubkey: address(0xaa).script_pubkey(),
                },
                TxOut {
                    value: Amount::from_sat(500),
                    script_pubkey: address(0xbb).script_pubkey(),
                },
            ],
        }
    }

    #[test]
    fn test_parse_round_trip_keeps_txid() {
        let tx = transaction(ScriptBuf::new());
        let raw = bitcoin::consensus::encode::serialize_hex(&tx);
        let parsed = parse_raw_transaction(&raw).unwrap();
        assert_eq!(txid(&parsed), txid(&tx));
        assert!(parse_raw_transaction("zz").is_err());
        assert!(parse_raw_transaction("00").is_err());
    }

    #[test]
    fn test_inputs_fingerprint_ignores_signatures() {
        let unsigned = transaction(ScriptBuf::new());
        let signed = transaction(ScriptBuf::from_bytes(vec![0x51, 0x52]));
        assert_ne!(txid(&unsigned), txid(&signed));
        assert_eq!(inputs_fingerprint(&unsigned), inputs_fingerprint(&signed));
        assert_eq!(inputs_fingerprint(&unsigned).len(), 64);
    }

    #[test]
    fn test_output_values() {
        let tx = transaction(ScriptBuf::new());
        let recipient = address(0xaa).to_string();
        assert_eq!(value_paid_to(&tx, &recipient, Network::Testnet), Some(9_000));
        assert_eq!(value_paid_to(&tx, &address(0xcc).to_string(), Network::Testnet), None);
        assert_eq!(value_paid_to(&tx, "not-an-address", Network::Testnet), None);
        assert_eq!(output_value(&tx, 1), Some(500));
        assert_eq!(output_value(&tx, 2), None);
    }

    #[test]
    fn test_value_paid_to_matches_any_address_spelling() {
        let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0x11; 20]));
        let mut tx = transaction(ScriptBuf::new());
        tx.output.push(TxOut {
            value: Amount::from_sat(7_000),
            script_pubkey: script.clone(),
        });
        let bech32 = Address::from_script(&script, Network::Testnet)
            .unwrap()
            .to_string();

        assert_eq!(value_paid_to(&tx, &bech32, Network::Testnet), Some(7_000));
        assert_eq!(value_paid_to(&tx, &bech32.to_uppercase(), Network::Testnet), Some(7_000));
        // valid address, wrong network
        assert_eq!(value_paid_to(&tx, &bech32, Network::Bitcoin), None);
    }
}
