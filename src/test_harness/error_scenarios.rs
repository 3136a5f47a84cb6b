//! Failure paths through the aggregation engine.

use super::*;
use crate::ext::{
    AbiFunction, AggregateError, CallBuilderEx, ContractError, ErrorRegistry, SendError,
};
use alloy::{network::EthereumWallet, primitives::U256, signers::local::PrivateKeySigner};

fn total_supply() -> AbiFunction {
    AbiFunction::parse("totalSupply()(uint256)").unwrap()
}

crate::register_custom_errors!(MockVault => [
    "InsufficientShares(uint256 requested, uint256 available)",
]);

#[tokio::test]
async fn test_allowed_failure_resolves_with_revert_reason() {
    let transport = MockTransport::new();
    transport.respond(TOKEN, |_| Ok(uint_word(5)));
    transport.revert_with_reason(VAULT, "vault paused");
    let client = mock_client(transport).await;

    let mut aggregate = client.aggregate();
    let ok = aggregate.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), true);
    let failed = aggregate.add_call(client.read_call(VAULT, &total_supply(), &[]).unwrap(), true);

    let output = aggregate.call().await.unwrap();
    assert!(output[0].is_ok());
    assert_eq!(output[1].as_ref().unwrap_err().revert_reason(), Some("vault paused"));

    assert_eq!(ok.await.unwrap(), vec![AbiValue::uint256(5u64)]);
    assert_eq!(failed.await.unwrap_err().revert_reason(), Some("vault paused"));
}

#[tokio::test]
async fn test_custom_error_in_sub_call() {
    let transport = MockTransport::new();
    let selector = crate::ext::selector("InsufficientShares(uint256,uint256)");
    transport.respond(VAULT, move |_| {
        let mut data = selector.to_vec();
        data.extend_from_slice(&uint_word(10));
        data.extend_from_slice(&uint_word(3));
        Err(data.into())
    });
    let client = mock_client(transport).await;

    let mut aggregate = client.aggregate();
    let handle = aggregate.add_call(client.read_call(VAULT, &total_supply(), &[]).unwrap(), true);
    aggregate.call().await.unwrap();

    let err = handle.await.unwrap_err();
    let custom = err.as_custom().expect("registered custom error");
    assert_eq!(custom.name, "InsufficientShares");
    assert_eq!(
        custom.fields,
        vec![AbiValue::uint256(10u64), AbiValue::uint256(3u64)]
    );
}

#[tokio::test]
async fn test_unregistered_error_falls_back_to_hex() {
    let transport = MockTransport::new();
    transport.respond(VAULT, |_| Err(vec![0xca, 0xfe, 0xba, 0xbe].into()));
    let client = ContractClient::with_error_registry(
        transport,
        ClientConfig::default(),
        ErrorRegistry::new(),
    )
    .await
    .unwrap();

    let mut aggregate = client.aggregate();
    let handle = aggregate.add_call(client.read_call(VAULT, &total_supply(), &[]).unwrap(), true);
    aggregate.call().await.unwrap();

    assert_eq!(handle.await.unwrap_err().revert_reason(), Some("0xcafebabe"));
}

#[tokio::test]
async fn test_required_failure_reverts_whole_aggregate() {
    let transport = MockTransport::new();
    transport.respond(TOKEN, |_| Ok(uint_word(5)));
    transport.revert_with_reason(VAULT, "vault paused");
    let client = mock_client(transport).await;

    let mut aggregate = client.aggregate();
    let ok = aggregate.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), false);
    let failed = aggregate.add_call(client.read_call(VAULT, &total_supply(), &[]).unwrap(), false);

    let err = aggregate.call().await.unwrap_err();
    let AggregateError::Contract(err) = err else {
        panic!("expected contract error, got {err:?}");
    };
    assert_eq!(err.revert_reason(), Some("Multicall3: call failed"));

    // Nobody is left waiting; every handle sees the aggregate's revert.
    assert_eq!(ok.await.unwrap_err().revert_reason(), Some("Multicall3: call failed"));
    assert_eq!(failed.await.unwrap_err().revert_reason(), Some("Multicall3: call failed"));
}

#[tokio::test]
async fn test_length_mismatch_fails_every_handle() {
    let transport = MockTransport::new();
    // Two calls, one result.
    transport.respond(MULTICALL3_ADDRESS, |_| {
        Ok(encode_results(vec![AbiValue::Tuple(vec![
            AbiValue::Bool(true),
            AbiValue::Bytes(uint_word(1)),
        ])]))
    });
    let client = mock_client(transport).await;

    let mut aggregate = client.aggregate();
    let a = aggregate.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), false);
    let b = aggregate.add_call(client.read_call(ORACLE, &total_supply(), &[]).unwrap(), false);

    let err = aggregate.call().await.unwrap_err();
    assert!(matches!(
        err,
        AggregateError::Contract(ContractError::Decoding { .. })
    ));
    let (a, b) = (a.await.unwrap_err(), b.await.unwrap_err());
    assert!(matches!(a, ContractError::Decoding { .. }));
    assert_eq!(a.to_string(), b.to_string());
}

#[tokio::test]
async fn test_garbage_response_is_decoding_error() {
    let transport = MockTransport::new();
    transport.respond(MULTICALL3_ADDRESS, |_| Ok(vec![0x01, 0x02].into()));
    let client = mock_client(transport).await;

    let mut aggregate = client.aggregate();
    let handle = aggregate.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), true);

    assert!(aggregate.call().await.is_err());
    assert!(matches!(handle.await, Err(ContractError::Decoding { .. })));
}

#[tokio::test]
async fn test_sub_call_decode_failure_only_affects_that_handle() {
    let transport = MockTransport::new();
    transport.respond(TOKEN, |_| Ok(uint_word(5)));
    // Too short for a uint256.
    transport.respond(ORACLE, |_| Ok(vec![0u8; 4].into()));
    let client = mock_client(transport).await;

    let mut aggregate = client.aggregate();
    let good = aggregate.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), true);
    let bad = aggregate.add_call(client.read_call(ORACLE, &total_supply(), &[]).unwrap(), true);

    let output = aggregate.call().await.unwrap();
    assert!(output[0].is_ok());
    assert!(matches!(output[1], Err(ContractError::Decoding { .. })));
    assert!(good.await.is_ok());
    assert!(matches!(bad.await, Err(ContractError::Decoding { .. })));
}

#[tokio::test]
async fn test_failed_nested_aggregate_fails_inner_handles() {
    let transport = MockTransport::new();
    transport.respond(TOKEN, |_| Ok(uint_word(5)));
    transport.revert_with_reason(VAULT, "nope");
    let client = mock_client(transport).await;

    let mut inner = client.aggregate();
    let inner_ok = inner.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), false);
    let inner_bad = inner.add_call(client.read_call(VAULT, &total_supply(), &[]).unwrap(), false);

    let mut outer = client.aggregate();
    let nested = outer.add_call(inner, true);
    let direct = outer.add_call(client.read_call(TOKEN, &total_supply(), &[]).unwrap(), true);

    outer.call().await.unwrap();

    assert_eq!(direct.await.unwrap(), vec![AbiValue::uint256(5u64)]);
    let reason = Some("Multicall3: call failed");
    assert_eq!(nested.await.unwrap_err().revert_reason(), reason);
    assert_eq!(inner_ok.await.unwrap_err().revert_reason(), reason);
    assert_eq!(inner_bad.await.unwrap_err().revert_reason(), reason);
}

#[tokio::test]
async fn test_value_mismatch_reverts() {
    let transport = MockTransport::new();
    let client = mock_client(transport.clone()).await;

    let mut aggregate = client.aggregate();
    aggregate.add_call(
        client
            .read_call(VAULT, &total_supply(), &[])
            .unwrap()
            .value(U256::from(4)),
        false,
    );
    let calldata = aggregate.encoded_calldata().unwrap();

    // Replaying the calldata without value trips Multicall3's check.
    let request = CallRequest::new(MULTICALL3_ADDRESS, calldata);
    let err = transport.execute(&request).unwrap_err();
    assert_eq!(err, error_string("Multicall3: value mismatch"));
}

#[tokio::test]
async fn test_rejected_aggregate_send_fails_handles() {
    let transport = MockTransport::new();
    transport.respond(TOKEN, |_| Ok(uint_word(5)));
    transport.reject_sends_with("insufficient funds for gas * price + value");
    let client = mock_client(transport.clone()).await;

    let mut aggregate = client.aggregate();
    let handle = aggregate.add_call(client.read_write_call(TOKEN, &total_supply(), &[]).unwrap(), false);

    let wallet = EthereumWallet::from(PrivateKeySigner::random());
    let err = aggregate.send(&wallet).await.unwrap_err();
    assert!(matches!(err, AggregateError::Send(SendError::Contract(_))));
    assert!(transport.sent().is_empty());

    // The simulation succeeded, but nothing was submitted.
    let err = handle.await.unwrap_err();
    assert!(matches!(err, ContractError::Provider(_)));
    assert!(err.to_string().contains("insufficient funds"));
}

#[tokio::test]
async fn test_aggregate_value_must_match_sub_calls() {
    let transport = MockTransport::new();
    let client = mock_client(transport.clone()).await;

    let mut aggregate = client.aggregate().value(U256::from(7));
    let handle = aggregate.add_call(
        client
            .read_call(VAULT, &total_supply(), &[])
            .unwrap()
            .value(U256::from(3)),
        false,
    );

    let err = aggregate.call().await.unwrap_err();
    assert!(matches!(
        err,
        AggregateError::ValueMismatch { requested, expected }
            if requested == U256::from(7) && expected == U256::from(3)
    ));
    assert!(transport.calls().is_empty());
    assert!(matches!(handle.await, Err(ContractError::NotExecuted)));

    // A matching value is accepted.
    let mut aggregate = client.aggregate().value(U256::from(3));
    aggregate.add_call(
        client
            .read_call(VAULT, &total_supply(), &[])
            .unwrap()
            .value(U256::from(3)),
        false,
    );
    aggregate.call().await.unwrap();
    assert_eq!(transport.calls()[0].request.value, U256::from(3));
}
