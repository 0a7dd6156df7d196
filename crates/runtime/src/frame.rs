/// Latest-wins slot flushed once per animation frame.
///
/// Requests made between two frames collapse into the most recent one.
#[derive(Debug)]
pub struct FrameSlot<T> {
    pending: Option<T>,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the request it replaced.
    pub fn request(&mut self, value: T) -> Option<T> {
        self.pending.replace(value)
    }

    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn clear(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
