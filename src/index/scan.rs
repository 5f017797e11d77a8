use crate::buffer::{PageRef, INVALID_PAGE_ID};
use crate::error::{PlumeError, PlumeResult};
use crate::index::btree_index::BTreeIndex;
use crate::storage::codec::{InternalNodeCodec, LeafNodeCodec};
use crate::storage::page::{LeafNode, RecordId};

/// Comparison operators accepted by `begin_scan`. The lower bound takes
/// `GT`/`GTE`, the upper bound `LT`/`LTE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    LT,
    LTE,
    GTE,
    GT,
}

/// Range-scan state machine. `Positioned` co-owns the pinned leaf it is
/// parked on; every transition out of it drops the pin.
#[derive(Default, Debug)]
pub(crate) enum ScanState {
    #[default]
    Idle,
    Positioned {
        page: PageRef,
        leaf: LeafNode,
        slot: usize,
    },
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct ScanCursor {
    pub(crate) state: ScanState,
    high_val: i32,
    high_op: Operator,
}

impl ScanCursor {
    pub(crate) fn new() -> Self {
        Self {
            state: ScanState::Idle,
            high_val: 0,
            high_op: Operator::LT,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = ScanState::Idle;
    }

    fn satisfies_upper(&self, key: i32) -> bool {
        match self.high_op {
            Operator::LT => key < self.high_val,
            Operator::LTE => key <= self.high_val,
            Operator::GT | Operator::GTE => false,
        }
    }
}

impl BTreeIndex {
    /// Positions a cursor on the first entry inside the half-open range.
    /// Any running scan is ended first; on any failure the cursor is back
    /// in `Idle`.
    pub fn begin_scan(
        &mut self,
        low_val: i32,
        low_op: Operator,
        high_val: i32,
        high_op: Operator,
    ) -> PlumeResult<()> {
        self.cursor.reset();

        if !matches!(low_op, Operator::GT | Operator::GTE)
            || !matches!(high_op, Operator::LT | Operator::LTE)
        {
            return Err(PlumeError::BadOpcodes(format!(
                "low {:?} must be GT/GTE and high {:?} must be LT/LTE",
                low_op, high_op
            )));
        }
        if low_val > high_val {
            return Err(PlumeError::BadScanRange(format!(
                "low {} exceeds high {}",
                low_val, high_val
            )));
        }

        // descend to the leaf that may contain the lower bound
        let mut page = self.fetch(self.root_page_id())?;
        if !self.root_is_leaf() {
            loop {
                let (node, child_is_leaf) = {
                    let guard = page.read();
                    let node = InternalNodeCodec::decode(guard.data())?.0;
                    let child_is_leaf = node.level == 1;
                    (node, child_is_leaf)
                };
                let child_index = node.scan_child_index(low_val);
                let child_page_id = *node.children.get(child_index).ok_or_else(|| {
                    PlumeError::Internal(format!("internal node missing child {}", child_index))
                })?;
                // the parent pin is released only after the child is pinned
                page = self.fetch(child_page_id)?;
                if child_is_leaf {
                    break;
                }
            }
        }

        let mut leaf = {
            let guard = page.read();
            LeafNodeCodec::decode(guard.data())?.0
        };

        // find the first entry past the lower bound, chasing right
        // siblings when the current leaf has none
        let mut slot = match low_op {
            Operator::GTE => leaf.lower_bound(low_val),
            Operator::GT => leaf.upper_bound(low_val),
            _ => unreachable!("validated above"),
        };
        while slot >= leaf.len() {
            let next_page_id = leaf.right_sibling;
            if next_page_id == INVALID_PAGE_ID {
                return Err(PlumeError::KeyNotFound);
            }
            page = self.fetch(next_page_id)?;
            leaf = {
                let guard = page.read();
                LeafNodeCodec::decode(guard.data())?.0
            };
            slot = match low_op {
                Operator::GTE => leaf.lower_bound(low_val),
                Operator::GT => leaf.upper_bound(low_val),
                _ => unreachable!("validated above"),
            };
        }

        self.cursor.high_val = high_val;
        self.cursor.high_op = high_op;
        if !self.cursor.satisfies_upper(leaf.keys[slot]) {
            return Err(PlumeError::KeyNotFound);
        }

        self.cursor.state = ScanState::Positioned { page, leaf, slot };
        Ok(())
    }

    /// Emits the rid under the cursor and advances it, following the
    /// right-sibling chain across leaves.
    pub fn next_scan(&mut self) -> PlumeResult<RecordId> {
        match std::mem::take(&mut self.cursor.state) {
            ScanState::Idle => Err(PlumeError::ScanNotStarted),
            ScanState::Exhausted => {
                self.cursor.state = ScanState::Exhausted;
                Err(PlumeError::ScanCompleted)
            }
            ScanState::Positioned { page, leaf, slot } => {
                let rid = leaf.rids[slot];

                if slot + 1 < leaf.len() {
                    if self.cursor.satisfies_upper(leaf.keys[slot + 1]) {
                        self.cursor.state = ScanState::Positioned {
                            page,
                            leaf,
                            slot: slot + 1,
                        };
                    } else {
                        self.cursor.state = ScanState::Exhausted;
                    }
                    return Ok(rid);
                }

                // off the end of this leaf: unpin it and try the sibling
                let mut next_page_id = leaf.right_sibling;
                drop(page);
                self.cursor.state = ScanState::Exhausted;
                while next_page_id != INVALID_PAGE_ID {
                    let next_page = self.fetch(next_page_id)?;
                    let next_leaf = {
                        let guard = next_page.read();
                        LeafNodeCodec::decode(guard.data())?.0
                    };
                    if next_leaf.is_empty() {
                        next_page_id = next_leaf.right_sibling;
                        continue;
                    }
                    if self.cursor.satisfies_upper(next_leaf.keys[0]) {
                        self.cursor.state = ScanState::Positioned {
                            page: next_page,
                            leaf: next_leaf,
                            slot: 0,
                        };
                    }
                    break;
                }
                Ok(rid)
            }
        }
    }

    /// Ends the scan and releases the cursor's leaf pin.
    pub fn end_scan(&mut self) -> PlumeResult<()> {
        match self.cursor.state {
            ScanState::Idle => Err(PlumeError::ScanNotStarted),
            _ => {
                self.cursor.reset();
                Ok(())
            }
        }
    }
}
