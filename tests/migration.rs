//! Legacy payloads: decryption compatibility and in-place upgrade.

use std::sync::Arc;

use seedvault::{
    Argon2Params, EncryptedPayload, KdfVersion, LifecycleState, MemorySlotStore, Mnemonic,
    SecurityLevel, SlotStore, Vault, VaultError, WalletConfig, WalletController,
};

const TWELVE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Sealed by the old web build: PBKDF2-SHA256 (100k) with password
/// "correct horse", salt 00..0f, IV 64..6f, AES-256-GCM without AAD.
const WEB_V1_RECORD: &str = r#"{
    "cipherBase64": "NTzyb1JviBeWheFBRdkz/gJc80OB4011V/YJVS2VV860Vwdhx+0POQ5fAENAerrFCxflG8pLZTz3xOIQ/RbqZgLTNUTHM66aqOSYaPy314WgO6lbNicnHRVl+OBoHdqFGcKe4WExkormom582g==",
    "ivBase64": "ZGVmZ2hpamtsbW5v",
    "saltBase64": "AAECAwQFBgcICQoLDA0ODw==",
    "version": 1
}"#;

fn light_config() -> WalletConfig {
    WalletConfig {
        argon2: Argon2Params {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        },
        ..WalletConfig::default()
    }
}

async fn stored_payload(slots: &MemorySlotStore) -> EncryptedPayload {
    let json = slots.read("wallet.encryptedMnemonic").await.unwrap().unwrap();
    EncryptedPayload::from_json(&json).unwrap()
}

#[test]
fn test_web_v1_record_decrypts() {
    let payload = EncryptedPayload::from_json(WEB_V1_RECORD).unwrap();
    assert_eq!(payload.version(), KdfVersion::Pbkdf2Sha256);
    assert!(Vault::is_migration_needed(&payload));
    assert!(matches!(
        Vault::ensure_current(&payload),
        Err(VaultError::MigrationRequired)
    ));

    let phrase = Vault::default().decrypt(&payload, "correct horse").unwrap();
    assert_eq!(phrase.as_str(), TWELVE);
}

#[test]
fn test_web_v1_record_rejects_wrong_password() {
    let payload = EncryptedPayload::from_json(WEB_V1_RECORD).unwrap();
    assert!(matches!(
        Vault::default().decrypt(&payload, "incorrect horse"),
        Err(VaultError::WrongPasswordOrCorruptPayload)
    ));
}

#[test]
fn test_reencryption_preserves_plaintext() {
    let phrase = Mnemonic::parse(TWELVE).unwrap();
    let legacy = Vault::seal_legacy(&phrase, "pw").unwrap();
    assert!(legacy.integrity().is_none());

    let vault = Vault::new(light_config().argon2);
    let opened = vault.decrypt(&legacy, "pw").unwrap();
    let upgraded = vault.encrypt(&opened, "pw").unwrap();

    assert_eq!(upgraded.version(), KdfVersion::Argon2id);
    assert_eq!(vault.decrypt(&upgraded, "pw").unwrap(), phrase);
}

#[tokio::test]
async fn test_unlock_upgrades_legacy_payload_in_place() {
    let slots = Arc::new(MemorySlotStore::new());
    slots.write("wallet.encryptedMnemonic", WEB_V1_RECORD).await.unwrap();

    let wallet = WalletController::new(light_config(), slots.clone()).unwrap();
    assert_eq!(wallet.restore().await.unwrap().state, LifecycleState::Locked);

    wallet.unlock("correct horse").await.unwrap();
    assert_eq!(wallet.state(), LifecycleState::Unlocked);
    assert_eq!(wallet.with_mnemonic(|m| m.as_str().to_string()).unwrap(), TWELVE);

    let upgraded = stored_payload(&slots).await;
    assert_eq!(upgraded.version(), KdfVersion::Argon2id);
    assert_eq!(
        Vault::new(light_config().argon2).decrypt(&upgraded, "correct horse").unwrap().as_str(),
        TWELVE
    );
}

#[tokio::test]
async fn test_failed_unlock_leaves_legacy_payload_untouched() {
    let slots = Arc::new(MemorySlotStore::new());
    slots.write("wallet.encryptedMnemonic", WEB_V1_RECORD).await.unwrap();

    let wallet = WalletController::new(light_config(), slots.clone()).unwrap();
    wallet.restore().await.unwrap();

    assert!(matches!(
        wallet.unlock("nope").await,
        Err(VaultError::WrongPasswordOrCorruptPayload)
    ));
    assert_eq!(wallet.state(), LifecycleState::Locked);
    assert_eq!(stored_payload(&slots).await.version(), KdfVersion::Pbkdf2Sha256);
}

#[tokio::test]
async fn test_plaintext_slot_is_encrypted_once_a_password_is_given() {
    let slots = Arc::new(MemorySlotStore::new());
    slots.write("wallet.legacyMnemonic", TWELVE).await.unwrap();

    let wallet = WalletController::new(light_config(), slots.clone()).unwrap();
    wallet.restore().await.unwrap();

    wallet.unlock("").await.unwrap();
    let weak = wallet.status().identity.unwrap();
    assert_eq!(weak.security_level, SecurityLevel::Weak);
    assert!(slots.read("wallet.legacyMnemonic").await.unwrap().is_some());

    wallet.lock().unwrap();
    wallet.unlock("fresh password").await.unwrap();

    let strong = wallet.status().identity.unwrap();
    assert_eq!(strong.security_level, SecurityLevel::Strong);
    assert_eq!(strong.address, weak.address);
    assert!(slots.read("wallet.legacyMnemonic").await.unwrap().is_none());
    assert_eq!(stored_payload(&slots).await.version(), KdfVersion::Argon2id);

    wallet.lock().unwrap();
    wallet.unlock("fresh password").await.unwrap();
    assert_eq!(wallet.state(), LifecycleState::Unlocked);
}
