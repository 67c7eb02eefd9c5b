//! Racing redeemers: exactly one wins, on either backend.

use std::sync::Arc;

use ezlock::core::{Clock, Lock, LockId, LockSecret, ManualClock};
use ezlock::store::{MemoryStore, SqliteStore, Store};
use ezlock::{Capabilities, Ezlock, EzlockConfig, EzlockError, GrantRequest, PrincipalId, Schedule};
use ezlock_testkit::{at, test_secret};

const MAC: &str = "AA:BB:CC:DD:EE:FF";
const RACERS: usize = 8;

async fn seed<S: Store>(store: &S, owner: PrincipalId) {
    let now = at("2024-06-01 12:00");
    let lock = Lock {
        id: LockId::generate(),
        mac: MAC.to_string(),
        secret: LockSecret::from_bytes(test_secret(MAC)),
        owner,
        valid: true,
        name: "race".into(),
        description: String::new(),
        model: String::new(),
        version: String::new(),
        created_at: now,
        updated_at: now,
    };
    store.insert_lock(&lock).await.unwrap();
}

async fn race<S: Store + 'static>(store: S) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(at("2024-06-01 12:00")));
    let owner = PrincipalId::generate();
    seed(&store, owner).await;

    let service = Arc::new(Ezlock::with_clock(
        Arc::new(store),
        clock,
        EzlockConfig::default(),
    ));
    let token = service
        .create_grant(
            &owner,
            &GrantRequest {
                lock_mac: MAC.to_string(),
                capabilities: Capabilities::NONE,
                schedule: Schedule::Permanent,
            },
        )
        .await
        .unwrap();

    let mut handles = Vec::with_capacity(RACERS);
    for _ in 0..RACERS {
        let service = Arc::clone(&service);
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            let who = PrincipalId::generate();
            (who, service.redeem_grant(&token, &who).await)
        }));
    }

    let mut winners = Vec::new();
    let mut used = 0;
    for handle in handles {
        match handle.await.unwrap() {
            (who, Ok(_)) => winners.push(who),
            (_, Err(EzlockError::AlreadyUsed(_))) => used += 1,
            (_, Err(other)) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(used, RACERS - 1);

    let grant = service
        .store()
        .get_grant(&token.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(grant.recipient, Some(winners[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeem_memory() {
    race(MemoryStore::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeem_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("race.db")).unwrap();
    race(store).await;
}
