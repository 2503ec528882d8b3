#[derive(Debug, Clone)]
pub struct ResultsBuffer<T> {
    capacity: usize,
    rows: Vec<T>,
    truncated: bool,
}

impl<T> ResultsBuffer<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rows: Vec::new(),
            truncated: false,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn push(&mut self, row: T) -> bool {
        if self.is_full() {
            self.truncated = true;
            return false;
        }
        self.rows.push(row);
        true
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, bool) {
        (self.rows, self.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::ResultsBuffer;

    #[test]
    fn keeps_first_rows_and_flags_overflow() {
        let mut buffer = ResultsBuffer::new(3);
        assert!(buffer.push("r1"));
        assert!(buffer.push("r2"));
        assert!(buffer.push("r3"));
        assert!(!buffer.is_truncated());
        assert!(!buffer.push("r4"));

        assert!(buffer.is_truncated());
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get(0), Some(&"r1"));
        assert_eq!(buffer.get(2), Some(&"r3"));
    }

    #[test]
    fn zero_capacity_truncates_on_first_row() {
        let mut buffer = ResultsBuffer::new(0);
        assert!(buffer.is_full());
        assert!(!buffer.push(1));

        let (rows, truncated) = buffer.into_parts();
        assert!(rows.is_empty());
        assert!(truncated);
    }
}
