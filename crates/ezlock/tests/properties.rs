//! Property tests for the pure parts of the service: schedule evaluation,
//! entitlement planning and the command cipher.

use chrono::{Duration, NaiveDateTime};
use proptest::prelude::*;

use ezlock::command::command_plaintext;
use ezlock::core::{crypto, Capabilities, Grant, GrantId, Lock, LockSecret, Schedule};
use ezlock::perms::{plan, Candidate};
use ezlock_testkit::generators::{instant, lock_id, lock_secret, principal_id, schedule};
use ezlock_testkit::{at, verify_all_vectors};

fn lock(id: ezlock::LockId, owner: ezlock::PrincipalId, valid: bool) -> Lock {
    let t = at("2024-01-01 00:00");
    Lock {
        id,
        mac: id.to_hex(),
        secret: LockSecret::from_bytes(vec![0u8; 16]),
        owner,
        valid,
        name: String::new(),
        description: String::new(),
        model: String::new(),
        version: String::new(),
        created_at: t,
        updated_at: t,
    }
}

fn grant(lock: &Lock, recipient: ezlock::PrincipalId, schedule: Schedule, valid: bool) -> Grant {
    Grant {
        id: GrantId::generate(),
        issuer: lock.owner,
        recipient: Some(recipient),
        lock_id: lock.id,
        schedule,
        capabilities: Capabilities::NONE,
        valid,
        created_at: lock.created_at,
        updated_at: lock.created_at,
    }
}

fn office_hours() -> Schedule {
    Schedule::TimeWindow {
        start_date: "2024-06-01".into(),
        end_date: "2024-06-01".into(),
        start_time: "09:00".into(),
        end_time: "18:00".into(),
    }
}

#[test]
fn test_golden_vectors() {
    assert!(verify_all_vectors().is_empty());
}

proptest! {
    #[test]
    fn permanent_is_always_valid(now in instant()) {
        prop_assert!(Schedule::Permanent.is_valid_at(now));
    }

    #[test]
    fn deadline_is_inclusive(deadline in instant(), offset in -600i64..600) {
        let now = deadline + Duration::minutes(offset);
        let schedule = Schedule::OneTimeDeadline {
            deadline: ezlock::core::format_minute(deadline),
        };
        prop_assert_eq!(schedule.is_valid_at(now), offset <= 0);
    }

    #[test]
    fn office_hours_window(minute in 0i64..1440, second in 0i64..60) {
        let now: NaiveDateTime =
            at("2024-06-01 00:00") + Duration::minutes(minute) + Duration::seconds(second);
        let expected = (9 * 60..=18 * 60).contains(&minute);
        prop_assert_eq!(office_hours().is_valid_at(now), expected);
    }

    #[test]
    fn valid_now_implies_satisfiable(s in schedule(), now in instant()) {
        if s.is_valid_at(now) {
            prop_assert!(s.is_satisfiable_from(now));
        }
    }

    #[test]
    fn owned_locks_always_resolve_as_owner(
        me in principal_id(),
        other in principal_id(),
        ids in prop::collection::vec(lock_id(), 1..6),
        schedules in prop::collection::vec(schedule(), 1..6),
        valid_only in any::<bool>(),
        now in instant(),
    ) {
        let owned: Vec<Lock> = ids.iter().map(|id| lock(*id, me, true)).collect();
        let foreign = lock(ids[0], other, true);

        // Grants to `me` on its own locks and on a foreign lock sharing an id.
        let mut delegated: Vec<Candidate> = owned
            .iter()
            .zip(schedules.iter())
            .map(|(l, s)| Candidate {
                grant: grant(l, me, s.clone(), true),
                lock: Some(l.clone()),
            })
            .collect();
        delegated.push(Candidate {
            grant: grant(&foreign, me, Schedule::Permanent, true),
            lock: Some(foreign.clone()),
        });

        let plan = plan(&owned, &delegated, valid_only, now);
        for l in &owned {
            prop_assert_eq!(plan.entitlements.get(&l.id), Some(true));
        }
    }

    #[test]
    fn stale_grants_are_exactly_flagged_but_ineffective(
        me in principal_id(),
        owner in principal_id(),
        id in lock_id(),
        s in schedule(),
        lock_valid in any::<bool>(),
        flag in any::<bool>(),
        now in instant(),
    ) {
        let l = lock(id, owner, lock_valid);
        let candidate = Candidate {
            grant: grant(&l, me, s.clone(), flag),
            lock: Some(l),
        };
        let effective = lock_valid && s.is_valid_at(now);

        let planned = plan(&[], std::slice::from_ref(&candidate), true, now);
        prop_assert_eq!(planned.stale_grants.len(), usize::from(flag && !effective));
        prop_assert_eq!(planned.entitlements.contains(&id), effective);
    }

    #[test]
    fn command_tokens_open_to_their_plaintext(
        secret in lock_secret(),
        who in principal_id(),
        now in instant(),
    ) {
        let plain = command_plaintext("open", now, &who);
        let token = crypto::seal(&secret, plain.as_bytes()).unwrap();
        prop_assert_eq!(crypto::open(&secret, &token).unwrap(), plain.into_bytes());
    }
}
