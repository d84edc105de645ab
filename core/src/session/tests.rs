use super::*;
use crate::types::DAY;

fn tracker() -> SessionTracker {
    SessionTracker::new(99 * DAY)
}

mod tracker {
    use super::*;

    #[test]
    fn test_issue_returns_valid_cookie() {
        let tracker = tracker();

        let cookie = tracker.issue().unwrap();

        assert_eq!(cookie.name, SESSION_COOKIE_NAME);
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.max_age, Some(99 * DAY));
        assert!(cookie.http_only);
        assert!(!cookie.expired);
        assert_eq!(cookie.same_site, SameSite::Lax);
        assert_eq!(cookie.value.len(), 32);
        assert!(tracker.is_valid(&cookie.value));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tracker = tracker();
        let a = tracker.issue().unwrap();
        let b = tracker.issue().unwrap();

        assert_ne!(a.value, b.value);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_unknown_token_is_invalid() {
        let tracker = tracker();
        tracker.issue().unwrap();
        assert!(!tracker.is_valid("not-a-session"));
    }

    #[test]
    fn test_revoke_invalidates_and_expires_cookie() {
        let tracker = tracker();
        let cookie = tracker.issue().unwrap();

        let expiring = tracker.revoke(&cookie.value);

        assert!(!tracker.is_valid(&cookie.value));
        assert!(expiring.expired);
        assert_eq!(expiring.max_age, None);
        assert_eq!(expiring.value, "");
    }

    #[test]
    fn test_close_drops_sessions_and_refuses_new() {
        let tracker = tracker();
        let cookie = tracker.issue().unwrap();

        tracker.close();

        assert!(!tracker.is_valid(&cookie.value));
        assert!(tracker.is_empty());
        assert_eq!(tracker.issue(), Err(SessionError::Closed));
    }
}

mod cookie {
    use super::*;

    #[test]
    fn test_header_value() {
        let cookie = SessionCookie::new("abc".to_string(), Some(DAY));
        assert_eq!(
            cookie.header_value(),
            "RelaySessionID=abc; Path=/; Max-Age=86400; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn test_expired_header_value() {
        let cookie = SessionCookie::new(String::new(), None);
        assert_eq!(
            cookie.header_value(),
            "RelaySessionID=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"
        );
    }
}

mod login_guard {
    use super::*;

    #[test]
    fn test_correct_password_issues_session() {
        let tracker = tracker();
        let guard = LoginGuard::default();

        let cookie = guard.login(&tracker, "secret", "secret").unwrap();

        assert!(tracker.is_valid(&cookie.value));
    }

    #[test]
    fn test_wrong_password_counts_down() {
        let tracker = tracker();
        let guard = LoginGuard::default();

        assert_eq!(
            guard.login(&tracker, "secret", "nope"),
            Err(SessionError::WrongPassword { remaining: 4 })
        );
        assert_eq!(
            guard.login(&tracker, "secret", "nope"),
            Err(SessionError::WrongPassword { remaining: 3 })
        );
        assert_eq!(guard.failures(), 2);
    }

    #[test]
    fn test_fifth_failure_closes_tracker() {
        let tracker = tracker();
        let guard = LoginGuard::default();
        let existing = guard.login(&tracker, "secret", "secret").unwrap();

        for _ in 0..MAX_LOGIN_ATTEMPTS - 1 {
            assert!(matches!(
                guard.login(&tracker, "secret", "nope"),
                Err(SessionError::WrongPassword { .. })
            ));
        }
        assert_eq!(
            guard.login(&tracker, "secret", "nope"),
            Err(SessionError::TooManyAttempts)
        );

        assert!(tracker.is_closed());
        assert!(!tracker.is_valid(&existing.value));
        assert_eq!(
            guard.login(&tracker, "secret", "secret"),
            Err(SessionError::TooManyAttempts)
        );
    }

    #[test]
    fn test_success_resets_failures() {
        let tracker = tracker();
        let guard = LoginGuard::default();

        for _ in 0..MAX_LOGIN_ATTEMPTS - 1 {
            let _ = guard.login(&tracker, "secret", "nope");
        }
        guard.login(&tracker, "secret", "secret").unwrap();
        assert_eq!(guard.failures(), 0);

        assert_eq!(
            guard.login(&tracker, "secret", "nope"),
            Err(SessionError::WrongPassword { remaining: 4 })
        );
        assert!(!tracker.is_closed());
    }
}
