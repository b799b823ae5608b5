//! Paginated block streaming.
//!
//! Each request runs as its own task walking the chain from a start
//! block, forward along height-0 forward links or backward along
//! height-0 back links, emitting one response per completed page into a
//! bounded channel. Error outcomes are data, not transport faults:
//!
//! * code 2: PageSize or NumPages below 1; single response, then close.
//! * code 4: ran out of blocks at a page boundary or at the start.
//! * code 6: backward traversal hit the genesis link's synthetic back
//!   link with slots still unfilled in the current page.
//!
//! The 4/6 boundary is positional: reaching genesis backward exactly at
//! the end of a page lets that page complete, and the next page (if
//! any) reports a plain code 4. A terminal response always carries zero
//! blocks, and nothing is emitted after it. Cancellation is cooperative
//! and checked between pages; dropping the canceler counts as a cancel.

use skipledger_core::{ChainLink, Hash};
use skipledger_storage::ChainStore;
use tokio::sync::{mpsc, oneshot};

/// Page delivered successfully.
pub const ERROR_OK: u64 = 0;
/// PageSize or NumPages below 1.
pub const ERROR_BAD_PARAMS: u64 = 2;
/// Traversal ran out of blocks.
pub const ERROR_EXHAUSTED: u64 = 4;
/// Backward traversal passed the genesis link mid-page.
pub const ERROR_PAST_GENESIS: u64 = 6;

/// Buffered pages between producer task and consumer.
const CHANNEL_CAPACITY: usize = 8;

/// A request for a range of blocks.
#[derive(Debug, Clone)]
pub struct PaginateRequest {
    /// Hash of the first block of the range.
    pub start_id: Hash,
    /// Blocks per page; must be at least 1.
    pub page_size: u64,
    /// Number of pages; must be at least 1.
    pub num_pages: u64,
    /// Follow back links instead of forward links.
    pub backward: bool,
}

/// One page, or one terminal error.
#[derive(Debug, Clone)]
pub struct PaginateResponse {
    pub blocks: Vec<ChainLink>,
    pub error_code: u64,
    pub error_text: Vec<String>,
}

impl PaginateResponse {
    fn page(blocks: Vec<ChainLink>) -> Self {
        Self {
            blocks,
            error_code: ERROR_OK,
            error_text: Vec::new(),
        }
    }

    fn error(error_code: u64, error_text: Vec<String>) -> Self {
        Self {
            blocks: Vec::new(),
            error_code,
            error_text,
        }
    }
}

/// Cancels a running pagination. Dropping it has the same effect.
pub struct Canceler {
    stop: oneshot::Sender<()>,
}

impl Canceler {
    /// Signal the task to stop at the next page boundary.
    pub fn cancel(self) {
        let _ = self.stop.send(());
    }
}

/// Start a pagination task over the given chain.
///
/// Returns the response channel and a cancellation handle. The channel
/// closes after the last page, after a terminal error, or once the
/// task observes cancellation.
pub fn paginate(
    chain: ChainStore,
    request: PaginateRequest,
) -> (mpsc::Receiver<PaginateResponse>, Canceler) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (stop, stopped) = oneshot::channel();
    tokio::spawn(run(chain, request, tx, stopped));
    (rx, Canceler { stop })
}

async fn run(
    chain: ChainStore,
    request: PaginateRequest,
    tx: mpsc::Sender<PaginateResponse>,
    mut stopped: oneshot::Receiver<()>,
) {
    if request.page_size < 1 || request.num_pages < 1 {
        let text = vec![
            "invalid pagination parameters".to_string(),
            format!("pagesize {}", request.page_size),
            format!("numpages {}", request.num_pages),
        ];
        let _ = tx.send(PaginateResponse::error(ERROR_BAD_PARAMS, text)).await;
        return;
    }

    let mut next = Some(request.start_id);
    for page in 0..request.num_pages {
        // Cooperative cancellation, checked between pages. A closed
        // canceler means the caller is gone; stop either way.
        match stopped.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => {}
            _ => {
                tracing::debug!(page, "pagination canceled");
                return;
            }
        }

        // page_size is caller-controlled; cap the preallocation so an
        // oversized request exhausts instead of aborting the task
        let mut blocks = Vec::with_capacity(request.page_size.min(64) as usize);
        for slot in 0..request.page_size {
            let current = match next {
                Some(hash) => hash,
                None => {
                    let _ = tx.send(exhausted(page, slot)).await;
                    return;
                }
            };
            let block = match chain.by_hash(&current) {
                Ok(Some(block)) => block,
                Ok(None) | Err(_) => {
                    let _ = tx.send(exhausted(page, slot)).await;
                    return;
                }
            };

            let at_genesis = request.backward && block.is_genesis();
            next = if request.backward {
                // back_links[0] of genesis is synthetic, never followed
                (!block.is_genesis()).then(|| block.back_links[0])
            } else {
                block.forward_links.first().copied()
            };
            blocks.push(block);

            if at_genesis && slot + 1 < request.page_size {
                let _ = tx
                    .send(past_genesis(&request.start_id, &current, page, slot + 1))
                    .await;
                return;
            }
        }

        tracing::debug!(page, blocks = blocks.len(), "pagination page ready");
        if tx.send(PaginateResponse::page(blocks)).await.is_err() {
            return;
        }
    }
}

/// Terminal code-4 response: ran out of blocks at `page`/`slot`.
fn exhausted(page: u64, slot: u64) -> PaginateResponse {
    PaginateResponse::error(
        ERROR_EXHAUSTED,
        vec![
            "traversal ran out of blocks".to_string(),
            page.to_string(),
            slot.to_string(),
        ],
    )
}

/// Terminal code-6 response: backward traversal reached the genesis
/// link's synthetic back link while `slot` of `page` was still
/// unfilled.
fn past_genesis(start: &Hash, genesis: &Hash, page: u64, slot: u64) -> PaginateResponse {
    PaginateResponse::error(
        ERROR_PAST_GENESIS,
        vec![
            "backward traversal passed the genesis link".to_string(),
            format!("start {}", start.short_hex()),
            "page".to_string(),
            page.to_string(),
            "index".to_string(),
            slot.to_string(),
            format!("genesis {}", genesis.short_hex()),
        ],
    )
}
