//! Hands purchase payloads to an external wallet by writing them to disk.

use chrono::Utc;
use jackpot_client::{
    Error,
    Result,
    purchase::{
        PurchasePayload,
        TransactionReceipt,
        WalletSigner,
    },
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const EXPORT_PREFIX: &str = "purchase-";

#[derive(Debug, Clone)]
pub struct ExportSigner {
    dir: PathBuf,
}

impl ExportSigner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn export(&self, payload: &PurchasePayload) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(payload).map_err(|e| {
            Error::TransactionFailure(format!("could not encode purchase: {e}"))
        })?;
        let name = format!(
            "{EXPORT_PREFIX}{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        );
        let path = self.dir.join(name);
        fs::write(&path, json).map_err(|e| {
            Error::TransactionFailure(format!("could not write {}: {e}", path.display()))
        })?;
        Ok(path)
    }
}

impl WalletSigner for ExportSigner {
    async fn sign_and_execute(&self, payload: &PurchasePayload) -> Result<TransactionReceipt> {
        let path = self.export(payload)?;
        tracing::info!(path = %path.display(), "purchase exported for signing");
        Ok(TransactionReceipt {
            digest: format!("exported:{}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use jackpot_client::types::{
        Address,
        Mist,
    };
    use tempdir::TempDir;

    fn payload() -> PurchasePayload {
        PurchasePayload {
            target: "0xfeed::jackpot_contract::buy_tickets".to_string(),
            registry: Address::from_u8(0x10),
            pool: Address::from_u8(0x20),
            split_from_gas: Mist(500_000_000),
            clock: Address::from_u8(6),
        }
    }

    #[tokio::test]
    async fn sign_and_execute__writes_payload_json() {
        // given
        let temp_dir = TempDir::new("export_signer").unwrap();
        let signer = ExportSigner::new(temp_dir.path());

        // when
        let receipt = signer.sign_and_execute(&payload()).await.unwrap();

        // then
        let path = receipt.digest.strip_prefix("exported:").unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(written["split_from_gas"], 500_000_000);
        assert_eq!(written["target"], "0xfeed::jackpot_contract::buy_tickets");
    }

    #[tokio::test]
    async fn sign_and_execute__missing_directory_is_transaction_failure() {
        // given
        let temp_dir = TempDir::new("export_signer").unwrap();
        let signer = ExportSigner::new(temp_dir.path().join("gone"));

        // when
        let result = signer.sign_and_execute(&payload()).await;

        // then
        assert!(matches!(result, Err(Error::TransactionFailure(_))));
    }
}
