use std::sync::atomic::{AtomicUsize, Ordering};

pub type MockClosureSignature<I, R> = Box<dyn Fn(I) -> R + Send + Sync>;

/// A stand-in for a runtime callback. Calls go to a fixed closure, or cycle through a sequence
/// of closures, and are counted. Callable through a shared reference from any thread.
pub struct MockMethod<I, R> {
    closures: Vec<MockClosureSignature<I, R>>,
    call_count: AtomicUsize,
}

impl<I, R> Default for MockMethod<I, R> {
    fn default() -> Self {
        Self::new_unimplemented()
    }
}

impl<I, R> MockMethod<I, R> {
    pub fn new_unimplemented() -> Self {
        Self::new_fixed(Box::new(|_| unimplemented!()))
    }

    pub fn new_default() -> Self
    where
        R: Default,
    {
        Self::new_fixed(Box::new(|_| R::default()))
    }

    pub fn new_fixed(closure: MockClosureSignature<I, R>) -> Self {
        Self::new_sequence(vec![closure])
    }

    pub fn new_sequence(closures: Vec<MockClosureSignature<I, R>>) -> Self {
        assert!(!closures.is_empty());
        Self {
            closures,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call(&self, args: I) -> R {
        let cur_call = self.call_count.fetch_add(1, Ordering::SeqCst);
        (self.closures[cur_call % self.closures.len()])(args)
    }

    pub fn is_called(&self) -> bool {
        self.call_count() > 0
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_fixed_multi_args() {
        let mock = MockMethod::new_fixed(Box::new(|(a, b): (usize, usize)| -> usize { a + b }));
        assert_eq!(mock.call_count(), 0);
        assert_eq!(mock.call((1, 1)), 2);
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn mock_sequence() {
        let mock = MockMethod::new_sequence(vec![
            Box::new(|()| -> usize { 0 }),
            Box::new(|()| -> usize { 1 }),
        ]);
        assert_eq!(mock.call(()), 0);
        assert_eq!(mock.call(()), 1);
        assert_eq!(mock.call(()), 0);
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn mock_shared_between_threads() {
        let mock = MockMethod::<(), ()>::new_default();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| mock.call(()));
            }
        });
        assert_eq!(mock.call_count(), 4);
    }
}
