//! Example: one server and three road-side units walking through two rounds.
//!
//! Run with: cargo run --example round_lifecycle
//! Set RUST_LOG=debug to see every ledger operation.

use chrono::Utc;
use rsu_core::{
    verify_endorsement, InitializeInput, NodeKey, ParticipantId, PosCheckInput, ReciteInput,
    RoundPlanBuilder, RsuConfig, RsuService, SledStore, SystemClock, TimeWindow,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("RSU attestation ledger - round lifecycle\n");

    // Participants are identified by their public keys.
    let server = NodeKey::generate();
    let nodes: Vec<NodeKey> = (0..3).map(|_| NodeKey::generate()).collect();
    let server_id = server.participant_id();
    let ids: Vec<ParticipantId> = nodes.iter().map(NodeKey::participant_id).collect();

    let dir = tempfile::tempdir()?;
    let store = SledStore::open(dir.path().join("ledger.sled"))?;
    let service = RsuService::open(RsuConfig::default(), SystemClock, store)?;

    println!("1. System initialization and registration");
    service.system_initialize(&server_id).await?;
    for (i, id) in ids.iter().enumerate() {
        let input = InitializeInput {
            info: server.endorse(id, Utc::now()),
            // Each node names every node registered before it.
            adjacent: ids[..i].to_vec(),
        };
        service.initialize(id, input).await?;
    }
    for id in &ids {
        let endorsed = match service.node_info(id).await {
            Some(info) => verify_endorsement(&server.public_key(), id, &info),
            None => false,
        };
        println!(
            "   {}.. peers: {}, endorsed: {}",
            &id.as_str()[..12],
            service.adj_list(id).await.len(),
            endorsed
        );
    }

    println!("\n2. Opening round 1");
    let plan = RoundPlanBuilder::new()
        .node_checks([ids[0].clone()])
        .cloud_checks([ids[0].clone()])
        .positive_checks([ids[1].clone()])
        .build();
    let round = service.next_round(&server_id, plan).await?;
    println!("   round {} open", round);

    println!("\n3. Declaring and reciting");
    service.declare_node_check(&ids[0], "frame-digest-0001").await?;
    for peer in &ids[1..] {
        let input = ReciteInput {
            round,
            to: ids[0].clone(),
            result: true,
        };
        service.recite_node(peer, input).await?;
    }
    let repeat = ReciteInput {
        round,
        to: ids[0].clone(),
        result: false,
    };
    if let Err(e) = service.recite_node(&ids[1], repeat).await {
        println!("   second recite rejected: {}", e);
    }

    let observations = PosCheckInput {
        round,
        to: ids[1].clone(),
        results: [("plate-A123".to_string(), true)].into_iter().collect(),
    };
    service.upload_positive_check_result(&server_id, observations).await?;

    println!("\n4. Closing round 1");
    let plan = RoundPlanBuilder::new().finalize(ids[0].clone(), true).build();
    service.next_round(&server_id, plan).await?;
    println!("   declared hash: {}", service.data_hash(&ids[0], round).await);

    println!("\n5. Long-term cache");
    let cached = service.update_long_term_cache(&ids[0], "frame-digest-0001").await?;
    println!("   confirmed from round {}", cached);
    let window = TimeWindow {
        start_time: service.query(|e| e.state().rounds.timestamp_of(1)).await?,
        end_time: Utc::now(),
    };
    println!("   cached hashes: {:?}", service.cloud_hash_by_time(&ids[0], window).await?);

    let root = service.state_root().await?;
    println!("\n   state root: {}", hex::encode(root));
    Ok(())
}
