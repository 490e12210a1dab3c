//! Verification engine laws: idempotent confirmation, N-of-M promotion,
//! demotion, reset, and the supplement loop.

use std::sync::Arc;

use chrono::{Duration, Utc};

use coach_recruit::error::CoreError;
use coach_recruit::workflows::recruiting::applications::{
    Application, ApplicationAnswer, ApplicationRepository, ApplicationStatus, DocumentStatus,
};
use coach_recruit::workflows::recruiting::domain::{
    AnswerId, ApplicationId, CatalogItemId, Principal, ProjectId, Role, UserId, WalletEntryId,
};
use coach_recruit::workflows::recruiting::notifications::NotificationKind;
use coach_recruit::workflows::recruiting::projects::{
    kst_date, Project, ProjectRepository, ProjectStatus, ProjectWeights,
};
use coach_recruit::workflows::recruiting::wallet::{WalletEntry, WalletRepository};
use coach_recruit::workflows::recruiting::{
    ApplicationService, MemorySettings, MemorySink, MemoryStore, SettingsProvider, SystemSettings,
    VerificationEngine, VerificationTarget,
};
use coach_recruit::workflows::recruiting::verification::{valid_count, VerificationStore};

fn verifier(id: &str) -> Principal {
    Principal::new(UserId::new(id), [Role::Verifier])
}

fn coach() -> Principal {
    Principal::new(UserId::new("coach-1"), [Role::Coach])
}

fn manager() -> Principal {
    Principal::new(UserId::new("pm-1"), [Role::ProjectManager])
}

struct Fixture {
    store: Arc<MemoryStore>,
    sink: Arc<MemorySink>,
    settings: Arc<MemorySettings>,
    engine: VerificationEngine<MemoryStore, MemorySink, MemorySettings>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let settings = Arc::new(MemorySettings::default());
    let engine = VerificationEngine::new(store.clone(), sink.clone(), settings.clone());
    Fixture {
        store,
        sink,
        settings,
        engine,
    }
}

fn seed_answer(store: &MemoryStore, application: &str, project: &str, answer: &str) -> AnswerId {
    let mut app = Application::new(
        ApplicationId::new(application),
        ProjectId::new(project),
        UserId::new("coach-1"),
        Utc::now(),
    );
    app.status = ApplicationStatus::Submitted;
    app.answers.push(ApplicationAnswer::new(
        AnswerId::new(answer),
        app.id.clone(),
        CatalogItemId::new("item-cert"),
        "KSC",
    ));
    store.insert_application(app).expect("application seeds");
    AnswerId::new(answer)
}

fn seed_wallet_entry(store: &MemoryStore, id: &str) -> WalletEntryId {
    let entry = WalletEntry::new(
        WalletEntryId::new(id),
        UserId::new("coach-1"),
        CatalogItemId::new("item-wallet"),
        "KSC",
        Utc::now(),
    );
    store.insert_entry(entry).expect("wallet entry seeds");
    WalletEntryId::new(id)
}

fn seed_project(store: &MemoryStore, id: &str) {
    let today = kst_date(Utc::now());
    store
        .insert_project(Project {
            id: ProjectId::new(id),
            name: "Youth coaching cohort".to_string(),
            status: ProjectStatus::Ready,
            recruit_start: today - Duration::days(10),
            recruit_end: today + Duration::days(10),
            activity_start: today + Duration::days(30),
            activity_end: today + Duration::days(120),
            max_participants: 5,
            weights: ProjectWeights {
                quantitative: 70,
                qualitative: 30,
            },
            items: Vec::new(),
            reviewers: Vec::new(),
            owner: UserId::new("pm-1"),
            assigned_manager: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .expect("project seeds");
}

#[test]
fn confirming_twice_is_a_precondition_failure() {
    let fx = fixture();
    let answer = seed_answer(&fx.store, "app-a1", "p-a1", "ans-a1");
    let target = VerificationTarget::Answer(answer);

    let first = fx.engine.confirm(&verifier("v-1"), &target).expect("first confirm");
    assert_eq!(first.valid_count, 1);
    assert!(!first.promoted);

    let second = fx.engine.confirm(&verifier("v-1"), &target);
    assert!(matches!(second, Err(CoreError::PreconditionFailed(_))));

    // The first confirmation also starts the review.
    let (_, stored) = fx
        .store
        .fetch_answer(&AnswerId::new("ans-a1"))
        .expect("lookup")
        .expect("answer exists");
    assert_eq!(stored.document_status, DocumentStatus::InReview);
}

#[test]
fn second_confirmation_promotes_and_reflects_into_the_wallet() {
    let fx = fixture();
    let answer = seed_answer(&fx.store, "app-b1", "p-b1", "ans-b1");
    let target = VerificationTarget::Answer(answer.clone());

    fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    let outcome = fx.engine.confirm(&verifier("v-2"), &target).expect("second");
    assert!(outcome.promoted);
    assert_eq!(outcome.valid_count, 2);

    let (_, stored) = fx
        .store
        .fetch_answer(&answer)
        .expect("lookup")
        .expect("answer exists");
    assert_eq!(stored.document_status, DocumentStatus::Approved);
    assert!(stored.reviewed_at.is_some());

    let linked = stored.linked_wallet_entry.expect("back-link set");
    let entry = fx
        .store
        .fetch_entry(&linked)
        .expect("lookup")
        .expect("entry exists");
    assert!(entry.globally_verified);
    assert_eq!(entry.user, UserId::new("coach-1"));
    assert_eq!(entry.value, "KSC");

    assert!(fx
        .sink
        .delivered()
        .iter()
        .any(|n| n.kind == NotificationKind::VerificationCompleted));

    // Terminal answers accept no further confirmations.
    let third = fx.engine.confirm(&verifier("v-3"), &target);
    assert!(matches!(third, Err(CoreError::PreconditionFailed(_))));
}

#[test]
fn wallet_entries_stay_unique_per_user_and_item() {
    let fx = fixture();
    let first = seed_answer(&fx.store, "app-c1", "p-c1", "ans-c1");
    let second = seed_answer(&fx.store, "app-c2", "p-c2", "ans-c2");

    for answer in [&first, &second] {
        let target = VerificationTarget::Answer(answer.clone());
        fx.engine.confirm(&verifier("v-1"), &target).expect("first");
        fx.engine.confirm(&verifier("v-2"), &target).expect("second");
    }

    let entries = fx
        .store
        .entries_for_user(&UserId::new("coach-1"))
        .expect("entries load");
    assert_eq!(entries.len(), 1);

    let (_, a1) = fx.store.fetch_answer(&first).expect("lookup").expect("exists");
    let (_, a2) = fx.store.fetch_answer(&second).expect("lookup").expect("exists");
    assert_eq!(a1.linked_wallet_entry, a2.linked_wallet_entry);
}

#[test]
fn cancel_demotes_and_a_fresh_confirm_restores() {
    let fx = fixture();
    let entry = seed_wallet_entry(&fx.store, "wal-d1");
    let target = VerificationTarget::Wallet(entry.clone());

    let first = fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    fx.engine.confirm(&verifier("v-2"), &target).expect("second");
    assert!(fx.store.fetch_entry(&entry).unwrap().unwrap().globally_verified);

    // Only the original verifier may cancel.
    let refused = fx.engine.cancel(&verifier("v-2"), &first.record);
    assert!(matches!(refused, Err(CoreError::PermissionDenied(_))));

    fx.engine.cancel(&verifier("v-1"), &first.record).expect("cancel");
    assert!(!fx.store.fetch_entry(&entry).unwrap().unwrap().globally_verified);
    assert_eq!(valid_count(fx.store.as_ref(), &target).unwrap(), 1);

    // Re-confirming revalidates the same record instead of minting another.
    let again = fx.engine.confirm(&verifier("v-1"), &target).expect("reconfirm");
    assert_eq!(again.record, first.record);
    assert!(again.promoted);
    assert_eq!(fx.store.records_for(&target).unwrap().len(), 2);
}

#[test]
fn raising_the_required_count_takes_effect_immediately() {
    let fx = fixture();
    let entry = seed_wallet_entry(&fx.store, "wal-e1");
    let target = VerificationTarget::Wallet(entry.clone());

    let admin = Principal::new(UserId::new("admin-1"), [Role::SuperAdmin]);
    let mut wanted = SystemSettings::default();
    wanted.required_verifier_count = 3;
    fx.settings.update(&admin, wanted).expect("settings update");

    fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    let second = fx.engine.confirm(&verifier("v-2"), &target).expect("second");
    assert!(!second.promoted);

    let third = fx.engine.confirm(&verifier("v-3"), &target).expect("third");
    assert!(third.promoted);
    assert!(fx.store.fetch_entry(&entry).unwrap().unwrap().globally_verified);
}

#[test]
fn reset_invalidates_everything_and_notifies_the_owner() {
    let fx = fixture();
    let entry = seed_wallet_entry(&fx.store, "wal-f1");
    let target = VerificationTarget::Wallet(entry.clone());

    fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    fx.engine.confirm(&verifier("v-2"), &target).expect("second");

    fx.engine
        .reset(&manager(), &entry, "certificate number illegible")
        .expect("reset");

    let stored = fx.store.fetch_entry(&entry).unwrap().unwrap();
    assert!(!stored.globally_verified);
    assert!(stored.globally_verified_at.is_none());
    assert_eq!(valid_count(fx.store.as_ref(), &target).unwrap(), 0);
    assert!(fx
        .sink
        .delivered()
        .iter()
        .any(|n| n.kind == NotificationKind::VerificationReset));
}

#[test]
fn supplement_round_trip_reaches_approval_again() {
    let fx = fixture();
    seed_project(&fx.store, "p-g1");
    let answer = seed_answer(&fx.store, "app-g1", "p-g1", "ans-g1");
    let target = VerificationTarget::Answer(answer.clone());

    fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    fx.engine
        .request_supplement(&verifier("v-1"), &target, "certificate scan unreadable")
        .expect("supplement request");

    let (_, requested) = fx.store.fetch_answer(&answer).unwrap().unwrap();
    assert_eq!(requested.document_status, DocumentStatus::SupplementRequested);
    let deadline = requested.supplement_deadline.expect("deadline set");
    assert!(deadline > Utc::now() + Duration::days(6));
    assert!(fx
        .sink
        .delivered()
        .iter()
        .any(|n| n.kind == NotificationKind::SupplementRequest));

    let applications =
        ApplicationService::new(fx.store.clone(), fx.sink.clone(), fx.settings.clone());
    applications
        .supplement_answer(&coach(), &answer, "KSC (reissued scan)", Vec::new(), None)
        .expect("supplement submits");

    let (_, supplemented) = fx.store.fetch_answer(&answer).unwrap().unwrap();
    assert_eq!(supplemented.document_status, DocumentStatus::Supplemented);
    // Old confirmations no longer count.
    assert_eq!(valid_count(fx.store.as_ref(), &target).unwrap(), 0);
    assert!(fx
        .sink
        .delivered()
        .iter()
        .any(|n| n.kind == NotificationKind::SupplementSubmitted));

    fx.engine.confirm(&verifier("v-1"), &target).expect("reconfirm");
    let outcome = fx.engine.confirm(&verifier("v-2"), &target).expect("second");
    assert!(outcome.promoted);
    let (_, approved) = fx.store.fetch_answer(&answer).unwrap().unwrap();
    assert_eq!(approved.document_status, DocumentStatus::Approved);
}

#[test]
fn refused_promotion_records_nothing() {
    let fx = fixture();
    let answer = seed_answer(&fx.store, "app-k1", "p-k1", "ans-k1");
    let target = VerificationTarget::Answer(answer.clone());

    fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    fx.engine
        .request_supplement(&verifier("v-1"), &target, "certificate scan unreadable")
        .expect("supplement request");

    // The second confirmation would promote, but an answer awaiting a
    // supplement cannot be approved; the whole confirm must roll off.
    let before = valid_count(fx.store.as_ref(), &target).expect("count loads");
    let refused = fx.engine.confirm(&verifier("v-2"), &target);
    assert!(matches!(refused, Err(CoreError::PreconditionFailed(_))));
    assert_eq!(valid_count(fx.store.as_ref(), &target).expect("count loads"), before);
    assert!(fx
        .store
        .find_record(&target, &UserId::new("v-2"))
        .expect("lookup")
        .is_none());

    let (_, stored) = fx.store.fetch_answer(&answer).unwrap().unwrap();
    assert_eq!(stored.document_status, DocumentStatus::SupplementRequested);
}

#[test]
fn verified_wallet_requires_reset_before_a_supplement() {
    let fx = fixture();
    let entry = seed_wallet_entry(&fx.store, "wal-h1");
    let target = VerificationTarget::Wallet(entry);

    fx.engine.confirm(&verifier("v-1"), &target).expect("first");
    fx.engine.confirm(&verifier("v-2"), &target).expect("second");

    let refused = fx
        .engine
        .request_supplement(&verifier("v-1"), &target, "needs a clearer scan");
    assert!(matches!(refused, Err(CoreError::PreconditionFailed(_))));
}

#[test]
fn confirmation_requires_a_verification_role() {
    let fx = fixture();
    let entry = seed_wallet_entry(&fx.store, "wal-i1");
    let target = VerificationTarget::Wallet(entry);

    let refused = fx.engine.confirm(&coach(), &target);
    assert!(matches!(refused, Err(CoreError::PermissionDenied(_))));

    let listed = fx.engine.list_pending(&verifier("v-1")).expect("pending lists");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].required_count, 2);
    assert!(!listed[0].principal_confirmed);
}
