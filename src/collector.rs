use {super::worker::Delivery, crossbeam_channel::Receiver};

/// Collector places worker results into their input positions.
///
/// It is the only writer of the output buffer, so the buffer needs no lock.
/// Failures are only counted here; the error that ends a run is kept by the
/// coordinator.
pub(crate) struct Collector<R> {
    slots: Vec<Option<R>>,
    written: usize,
    failed: usize,
}

impl<R> Collector<R> {
    pub(crate) fn new(len: usize) -> Collector<R> {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Collector {
            slots,
            written: 0,
            failed: 0,
        }
    }

    pub(crate) fn accept(&mut self, delivery: Delivery<R>) {
        match delivery {
            Delivery::Done { index, value } => {
                let slot = &mut self.slots[index];
                debug_assert!(slot.is_none(), "slot {} written twice", index);
                *slot = Some(value);
                self.written += 1;
            }
            Delivery::Failed { index } => {
                tracing::trace!(index, "item reported failure");
                self.failed += 1;
            }
        }
    }

    /// Consumes deliveries until every slot is written or every worker has
    /// dropped its sender.
    pub(crate) fn drain(mut self, results: Receiver<Delivery<R>>) -> Collector<R> {
        while !self.is_complete() {
            match results.recv() {
                Ok(delivery) => self.accept(delivery),
                Err(_) => break,
            }
        }
        self
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.written == self.slots.len()
    }

    pub(crate) fn written(&self) -> usize {
        self.written
    }

    pub(crate) fn failed(&self) -> usize {
        self.failed
    }

    /// The outputs in input order, or `None` if any slot is still empty.
    pub(crate) fn finish(self) -> Option<Vec<R>> {
        if !self.is_complete() {
            return None;
        }
        self.slots.into_iter().collect()
    }
}
