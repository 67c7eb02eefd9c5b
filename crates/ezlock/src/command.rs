//! Command tokens: what a client relays to the lock to make it act.
//!
//! The plaintext is `<opcode>_<YYYY-MM-DD HH:MM>_<principal hex>`, sealed
//! under the lock's secret with a fresh random IV.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use ezlock_core::{crypto, format_minute, Capabilities, LockSecret, PrincipalId, BLOCK_SIZE};

use crate::config::OpcodeConfig;
use crate::error::{EzlockError, Result};

/// The operation a command token asks the lock to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationKind {
    Open,
    GetLog,
    AddCard,
    #[serde(rename_all = "camelCase")]
    DelCard { card_number: String },
}

impl OperationKind {
    /// Capabilities a delegate needs for this operation. Owners need none.
    pub fn required_capabilities(&self) -> Capabilities {
        match self {
            OperationKind::GetLog => Capabilities::VIEW_LOG,
            OperationKind::AddCard => Capabilities::ADD_CARD,
            OperationKind::Open | OperationKind::DelCard { .. } => Capabilities::NONE,
        }
    }

    /// The firmware opcode.
    pub fn opcode(&self, opcodes: &OpcodeConfig) -> String {
        match self {
            OperationKind::Open => opcodes.open.clone(),
            OperationKind::GetLog => opcodes.get_log.clone(),
            OperationKind::AddCard => opcodes.add_card.clone(),
            OperationKind::DelCard { card_number } => {
                format!("{}{}", opcodes.del_card_prefix, card_number)
            }
        }
    }
}

/// The caller-supplied IV buffer must be exactly one block. Its content is
/// never used.
pub fn check_code_buffer(code_buffer: &[u8]) -> Result<()> {
    if code_buffer.len() != BLOCK_SIZE {
        return Err(EzlockError::CryptoFailure(format!(
            "code buffer must be {} bytes, got {}",
            BLOCK_SIZE,
            code_buffer.len()
        )));
    }
    Ok(())
}

/// Build the command plaintext.
pub fn command_plaintext(opcode: &str, now: NaiveDateTime, principal: &PrincipalId) -> String {
    format!("{}_{}_{}", opcode, format_minute(now), principal.to_hex())
}

/// Build and seal a command token.
pub fn seal_command(
    secret: &LockSecret,
    opcode: &str,
    now: NaiveDateTime,
    principal: &PrincipalId,
) -> Result<String> {
    let plaintext = command_plaintext(opcode, now, principal);
    Ok(crypto::seal(secret, plaintext.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezlock_core::{parse_minute, ID_LEN};

    #[test]
    fn test_required_capabilities() {
        assert_eq!(
            OperationKind::GetLog.required_capabilities(),
            Capabilities::VIEW_LOG
        );
        assert_eq!(
            OperationKind::AddCard.required_capabilities(),
            Capabilities::ADD_CARD
        );
        assert!(OperationKind::Open.required_capabilities().is_empty());
        assert!(OperationKind::DelCard {
            card_number: "1".into()
        }
        .required_capabilities()
        .is_empty());
    }

    #[test]
    fn test_default_opcodes() {
        let ops = OpcodeConfig::default();
        assert_eq!(OperationKind::Open.opcode(&ops), "open");
        assert_eq!(OperationKind::GetLog.opcode(&ops), "getlog");
        assert_eq!(OperationKind::AddCard.opcode(&ops), "addcard");
        assert_eq!(
            OperationKind::DelCard {
                card_number: "0042".into()
            }
            .opcode(&ops),
            "delcard:0042"
        );
    }

    #[test]
    fn test_code_buffer_length() {
        assert!(check_code_buffer(&[0u8; 16]).is_ok());
        assert!(matches!(
            check_code_buffer(&[0u8; 15]),
            Err(EzlockError::CryptoFailure(_))
        ));
        assert!(check_code_buffer(&[]).is_err());
    }

    #[test]
    fn test_plaintext_layout() {
        let principal = PrincipalId::from_bytes([0xab; ID_LEN]);
        let text = command_plaintext("open", parse_minute("2024-06-01 12:34").unwrap(), &principal);
        assert_eq!(text, "open_2024-06-01 12:34_abababababababababababab");
    }

    #[test]
    fn test_sealed_command_opens() {
        let secret = LockSecret::from_bytes(vec![3u8; 24]);
        let principal = PrincipalId::from_bytes([1; ID_LEN]);
        let now = parse_minute("2024-06-01 12:34").unwrap();

        let token = seal_command(&secret, "getlog", now, &principal).unwrap();
        let plain = crypto::open(&secret, &token).unwrap();
        assert_eq!(
            String::from_utf8(plain).unwrap(),
            command_plaintext("getlog", now, &principal)
        );
    }
}
