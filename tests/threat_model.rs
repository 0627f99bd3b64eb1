//! Threat-model tests: what an attacker with disk access, log access or a
//! swapped payload can and cannot learn.

use std::sync::Arc;

use seedvault::{
    AddressDeriver, Argon2Params, FileSlotStore, MemorySlotStore, Mnemonic, SlotStore, VaultError,
    WalletConfig, WalletController,
};

const TWELVE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

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

fn dir_contents(dir: &std::path::Path) -> String {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_disk_holds_no_plaintext_when_password_is_set() {
    // Threat Model: attacker copies the wallet directory.
    // Goal: no word of the phrase appears anywhere on disk.
    let dir = tempfile::tempdir().unwrap();
    let wallet = WalletController::new(light_config(), Arc::new(FileSlotStore::new(dir.path()))).unwrap();

    wallet.create_wallet("pw").await.unwrap();
    let words: Vec<String> = wallet
        .with_mnemonic(|m| m.words().map(str::to_string).collect())
        .unwrap();

    let on_disk = dir_contents(dir.path());
    assert!(on_disk.contains("cipherBase64"));
    let phrase = words.join(" ");
    assert!(!on_disk.contains(&phrase));
    assert!(!on_disk.contains(&words[..4].join(" ")));
}

#[tokio::test]
async fn test_wipe_removes_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let wallet = WalletController::new(light_config(), Arc::new(FileSlotStore::new(dir.path()))).unwrap();

    wallet.import_wallet(TWELVE, "pw").await.unwrap();
    assert!(std::fs::read_dir(dir.path()).unwrap().count() > 0);

    wallet.wipe().await.unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_debug_output_is_redacted() {
    // Threat Model: phrase leaks through logs or crash reports.
    let phrase = Mnemonic::parse(TWELVE).unwrap();
    let rendered = format!("{phrase:?}");
    assert!(!rendered.contains("abandon"));
    assert!(rendered.contains("12 words"));
}

#[tokio::test]
async fn test_controller_debug_never_shows_phrase() {
    let wallet = WalletController::new(light_config(), Arc::new(MemorySlotStore::new())).unwrap();
    wallet.import_wallet(TWELVE, "pw").await.unwrap();
    assert!(!format!("{wallet:?}").contains("abandon"));
}

#[tokio::test]
async fn test_errors_never_echo_input() {
    let wallet = WalletController::new(light_config(), Arc::new(MemorySlotStore::new())).unwrap();
    let secret_password = "s3cret-passw0rd";

    let err = wallet
        .import_wallet("abandon abandon abandon", secret_password)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(!message.contains("abandon"));
    assert!(!message.contains(secret_password));

    wallet.import_wallet(TWELVE, secret_password).await.unwrap();
    wallet.lock().unwrap();
    let err = wallet.unlock("guess").await.unwrap_err();
    assert!(!err.to_string().contains("guess"));
}

#[tokio::test]
async fn test_swapped_payload_is_rejected() {
    // Threat Model: attacker replaces the payload with one they control,
    // sealed under the same password, hoping the user signs with their keys.
    let victim_slots = Arc::new(MemorySlotStore::new());
    let victim = WalletController::new(light_config(), victim_slots.clone()).unwrap();
    victim.import_wallet(TWELVE, "shared").await.unwrap();
    victim.lock().unwrap();

    let attacker_slots = Arc::new(MemorySlotStore::new());
    let attacker = WalletController::new(light_config(), attacker_slots.clone()).unwrap();
    attacker.create_wallet("shared").await.unwrap();

    let forged = attacker_slots.read("wallet.encryptedMnemonic").await.unwrap().unwrap();
    victim_slots.write("wallet.encryptedMnemonic", &forged).await.unwrap();

    assert!(matches!(
        victim.unlock("shared").await,
        Err(VaultError::WrongPasswordOrCorruptPayload)
    ));
}

#[tokio::test]
async fn test_garbage_payload_reads_as_corrupt() {
    let slots = Arc::new(MemorySlotStore::new());
    let wallet = WalletController::new(light_config(), slots.clone()).unwrap();
    wallet.import_wallet(TWELVE, "pw").await.unwrap();
    wallet.lock().unwrap();

    slots.write("wallet.encryptedMnemonic", "{not json").await.unwrap();
    assert!(matches!(
        wallet.unlock("pw").await,
        Err(VaultError::WrongPasswordOrCorruptPayload)
    ));
}

struct BrokenDeriver;

impl AddressDeriver for BrokenDeriver {
    fn derive_address(&self, _: &Mnemonic) -> Result<String, VaultError> {
        Err(VaultError::InvalidMnemonic)
    }
}

#[tokio::test]
async fn test_failed_derivation_writes_nothing() {
    let slots = Arc::new(MemorySlotStore::new());
    let wallet = WalletController::new(light_config(), slots.clone())
        .unwrap()
        .with_deriver(Arc::new(BrokenDeriver));

    assert!(wallet.import_wallet(TWELVE, "pw").await.is_err());
    assert!(slots.slot_names().is_empty());
}

#[tokio::test]
async fn test_inflated_kdf_cost_is_refused_without_deriving() {
    // Threat Model: attacker edits the stored record's Argon2 cost.
    // Goal: unlock fails fast instead of allocating gigabytes.
    let slots = Arc::new(MemorySlotStore::new());
    let wallet = WalletController::new(light_config(), slots.clone()).unwrap();
    wallet.import_wallet(TWELVE, "pw").await.unwrap();
    wallet.lock().unwrap();

    let stored = slots.read("wallet.encryptedMnemonic").await.unwrap().unwrap();
    let mut record: serde_json::Value = serde_json::from_str(&stored).unwrap();
    record["kdfParams"]["m_cost"] = serde_json::json!(u32::MAX);
    slots
        .write("wallet.encryptedMnemonic", &record.to_string())
        .await
        .unwrap();

    assert!(matches!(
        wallet.unlock("pw").await,
        Err(VaultError::WrongPasswordOrCorruptPayload)
    ));
}
