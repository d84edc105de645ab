use super::*;

fn policy() -> LifecyclePolicy {
    LifecyclePolicy::default()
}

#[test]
fn fresh_until_grey_threshold() {
    let now = SystemTime::now();
    assert_eq!(policy().state_at(now, now), LifecycleState::Fresh);
    assert_eq!(
        policy().state_at(now - 15 * DAY, now),
        LifecycleState::Fresh
    );
}

#[test]
fn grey_after_sixteen_days() {
    let now = SystemTime::now();
    assert_eq!(
        policy().state_at(now - 16 * DAY, now),
        LifecycleState::Grey
    );
}

#[test]
fn expired_after_thirty_one_days() {
    let now = SystemTime::now();
    assert_eq!(
        policy().state_at(now - 31 * DAY, now),
        LifecycleState::Expired
    );
}

#[test]
fn future_timestamps_are_fresh() {
    let now = SystemTime::now();
    assert_eq!(
        policy().state_at(now + DAY, now),
        LifecycleState::Fresh
    );
}

#[test]
fn cutoffs_are_relative_to_now() {
    let now = SystemTime::now();
    assert_eq!(policy().grey_cutoff(now), Some(now - 15 * DAY));
    assert_eq!(policy().expire_cutoff(now), Some(now - 30 * DAY));
}

#[test]
fn scope_filters_kinds() {
    assert!(SweepScope::AllKinds.includes(RecordKind::TextContent));
    assert!(SweepScope::FilesOnly.includes(RecordKind::FileContent));
    assert!(!SweepScope::FilesOnly.includes(RecordKind::TextContent));
}
