/// Generation stamp attached to every outgoing fetch.
///
/// Small and copyable so it can ride along with a `FetchJob` and come back
/// with its outcome; only the latest token of a family may mutate state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

/// Monotonic token source for one fetch family (last request wins).
#[derive(Debug, Default, Clone)]
pub struct RequestCounter {
    current: u64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new token, making every earlier one stale.
    pub fn next(&mut self) -> RequestToken {
        self.current = self.current.wrapping_add(1);
        RequestToken(self.current)
    }

    pub fn current(&self) -> Option<RequestToken> {
        (self.current != 0).then_some(RequestToken(self.current))
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.current != 0 && token.0 == self.current
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestCounter, RequestToken};

    #[test]
    fn only_latest_token_is_current() {
        let mut c = RequestCounter::new();
        assert_eq!(c.current(), None);
        assert!(!c.is_current(RequestToken(0)));

        let a = c.next();
        assert!(c.is_current(a));
        let b = c.next();
        assert!(!c.is_current(a));
        assert!(c.is_current(b));
        assert!(b > a);
    }
}
