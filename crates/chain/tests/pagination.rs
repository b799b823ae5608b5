//! Pagination protocol tests: page delivery, the error taxonomy and
//! cancellation.

use skipledger_chain::{
    GenesisConfig, Ledger, LocalSigner, PaginateRequest, PaginateResponse, ERROR_BAD_PARAMS,
    ERROR_EXHAUSTED, ERROR_OK, ERROR_PAST_GENESIS,
};
use skipledger_contracts::{ContractRegistry, CONTRACT_VALUE};
use skipledger_core::{Argument, ChainLink, ClientTransaction, Hash, Instruction, Keypair, Roster};
use skipledger_storage::Storage;
use std::sync::Arc;
use std::time::Duration;

/// A ledger whose chain holds the genesis link plus `extra` blocks.
/// Returns every link in index order.
fn ledger_with_blocks(extra: usize) -> (Ledger, Vec<ChainLink>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let admin = Keypair::generate();
    let signer = Arc::new(LocalSigner::new(vec![Keypair::from_private_key(
        &admin.private_key(),
    )]));
    let ledger = Ledger::new(
        Arc::new(Storage::open_temporary().unwrap()),
        ContractRegistry::standard(),
        signer,
        Roster::new(vec![admin.identity()]),
        GenesisConfig::new(admin.identity()),
    )
    .unwrap();

    let mut links = vec![ledger.head().unwrap()];
    for i in 0..extra {
        let counter = ledger.counter(&admin.identity()) + 1;
        let instr = Instruction::spawn(
            ledger.genesis_darc_id(),
            CONTRACT_VALUE,
            vec![Argument::new("value", format!("block {}", i).into_bytes())],
            vec![counter],
        );
        ledger
            .submit(ClientTransaction::new(vec![instr]).signed(&admin))
            .unwrap();
        links.push(ledger.produce_block().unwrap().unwrap());
    }
    (ledger, links)
}

fn request(start: Hash, page_size: u64, num_pages: u64, backward: bool) -> PaginateRequest {
    PaginateRequest {
        start_id: start,
        page_size,
        num_pages,
        backward,
    }
}

/// Receive with a timeout so a wedged task fails the test instead of
/// hanging it.
async fn recv(
    rx: &mut tokio::sync::mpsc::Receiver<PaginateResponse>,
) -> Option<PaginateResponse> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("pagination response timed out")
}

/// The channel must be closed, with nothing further on it.
async fn assert_closed(rx: &mut tokio::sync::mpsc::Receiver<PaginateResponse>) {
    assert!(recv(rx).await.is_none());
}

#[tokio::test]
async fn test_single_page_single_block() {
    let (ledger, links) = ledger_with_blocks(0);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 1, 1, false));

    let page = recv(&mut rx).await.unwrap();
    assert_eq!(page.error_code, ERROR_OK);
    assert_eq!(page.blocks.len(), 1);
    assert_eq!(page.blocks[0].hash(), links[0].hash());
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_page_larger_than_chain_exhausts() {
    let (ledger, links) = ledger_with_blocks(0);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 2, 1, false));

    let resp = recv(&mut rx).await.unwrap();
    assert_eq!(resp.error_code, ERROR_EXHAUSTED);
    assert!(resp.blocks.is_empty());
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_second_page_exhausts_with_position() {
    let (ledger, links) = ledger_with_blocks(0);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 1, 2, false));

    let first = recv(&mut rx).await.unwrap();
    assert_eq!(first.error_code, ERROR_OK);
    assert_eq!(first.blocks[0].hash(), links[0].hash());

    let second = recv(&mut rx).await.unwrap();
    assert_eq!(second.error_code, ERROR_EXHAUSTED);
    assert!(second.blocks.is_empty());
    assert_eq!(second.error_text.len(), 3);
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_invalid_parameters_rejected() {
    let (ledger, links) = ledger_with_blocks(1);
    for (page_size, num_pages, backward) in
        [(0, 1, false), (1, 0, false), (0, 0, true), (0, 5, true)]
    {
        let (mut rx, _cancel) =
            ledger.paginate(request(links[0].hash(), page_size, num_pages, backward));
        let resp = recv(&mut rx).await.unwrap();
        assert_eq!(resp.error_code, ERROR_BAD_PARAMS);
        assert!(resp.blocks.is_empty());
        assert_closed(&mut rx).await;
    }
}

#[tokio::test]
async fn test_backward_from_genesis_hits_synthetic_link() {
    let (ledger, links) = ledger_with_blocks(0);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 2, 1, true));

    let resp = recv(&mut rx).await.unwrap();
    assert_eq!(resp.error_code, ERROR_PAST_GENESIS);
    assert!(resp.blocks.is_empty());
    assert_eq!(resp.error_text.len(), 7);
    assert_eq!(resp.error_text[3], "0");
    assert_eq!(resp.error_text[5], "1");
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_backward_full_page_ending_at_genesis() {
    let (ledger, links) = ledger_with_blocks(1);
    let (mut rx, _cancel) = ledger.paginate(request(links[1].hash(), 2, 1, true));

    let page = recv(&mut rx).await.unwrap();
    assert_eq!(page.error_code, ERROR_OK);
    assert_eq!(page.blocks.len(), 2);
    assert_eq!(page.blocks[0].hash(), links[1].hash());
    assert_eq!(page.blocks[1].hash(), links[0].hash());
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_backward_page_boundary_degrades_to_plain_exhaustion() {
    // Genesis lands exactly at the end of page 0, so page 0 completes
    // and page 1 reports ordinary exhaustion, not the genesis code
    let (ledger, links) = ledger_with_blocks(0);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 1, 2, true));

    let first = recv(&mut rx).await.unwrap();
    assert_eq!(first.error_code, ERROR_OK);
    assert_eq!(first.blocks[0].hash(), links[0].hash());

    let second = recv(&mut rx).await.unwrap();
    assert_eq!(second.error_code, ERROR_EXHAUSTED);
    assert_eq!(second.error_text.len(), 3);
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_forward_multi_page_walk() {
    let (ledger, links) = ledger_with_blocks(6);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 2, 3, false));

    for page_index in 0..3 {
        let page = recv(&mut rx).await.unwrap();
        assert_eq!(page.error_code, ERROR_OK);
        let hashes: Vec<Hash> = page.blocks.iter().map(|b| b.hash()).collect();
        assert_eq!(
            hashes,
            vec![
                links[page_index * 2].hash(),
                links[page_index * 2 + 1].hash()
            ]
        );
    }
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_oversized_page_size_exhausts_cleanly() {
    // A huge page size is valid, it just runs out of blocks; the
    // request must still end in a terminal response
    let (ledger, links) = ledger_with_blocks(1);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), u64::MAX, 1, false));

    let resp = recv(&mut rx).await.expect("terminal response expected");
    assert_eq!(resp.error_code, ERROR_EXHAUSTED);
    assert!(resp.blocks.is_empty());
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_unknown_start_id_exhausts_immediately() {
    let (ledger, _links) = ledger_with_blocks(1);
    let (mut rx, _cancel) = ledger.paginate(request(Hash([0xEE; 32]), 1, 1, false));

    let resp = recv(&mut rx).await.unwrap();
    assert_eq!(resp.error_code, ERROR_EXHAUSTED);
    assert!(resp.blocks.is_empty());
    assert_closed(&mut rx).await;
}

#[tokio::test]
async fn test_nothing_after_terminal_response() {
    let (ledger, links) = ledger_with_blocks(0);
    let (mut rx, _cancel) = ledger.paginate(request(links[0].hash(), 3, 5, false));

    let resp = recv(&mut rx).await.unwrap();
    assert_eq!(resp.error_code, ERROR_EXHAUSTED);
    // Generous window: the channel stays silent and closes
    let after = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    assert!(after.expect("channel should be closed").is_none());
}

#[tokio::test]
async fn test_cancellation_stops_delivery() {
    let (ledger, links) = ledger_with_blocks(12);
    let (mut rx, cancel) = ledger.paginate(request(links[0].hash(), 1, 10, false));

    // Without cancellation ten pages would arrive. Cancel before
    // consuming: the task fills the channel, blocks, then observes the
    // cancel at the next page boundary.
    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut pages = 0;
    while let Some(page) = recv(&mut rx).await {
        assert_eq!(page.error_code, ERROR_OK);
        pages += 1;
    }
    assert!(pages < 10, "cancellation did not stop delivery: {}", pages);
}

#[tokio::test]
async fn test_dropping_canceler_stops_delivery() {
    let (ledger, links) = ledger_with_blocks(12);
    let (mut rx, cancel) = ledger.paginate(request(links[0].hash(), 1, 10, false));
    drop(cancel);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut pages = 0;
    while recv(&mut rx).await.is_some() {
        pages += 1;
    }
    assert!(pages < 10);
}
