//! Verify build/parse against JSON test vectors stored in `test-vectors/`.
//!
//! Each case names an operation by its contract name and describes its
//! inputs, the expected request, a simulated response and either the
//! expected parse result or the expected error. Comparing parsed JSON (not
//! raw strings) avoids false negatives from field-ordering differences.

use kickstart_core::contract::{self, Endpoint};
use kickstart_core::{Anonymous, ApiClient, ApiError, ClientConfig, HttpMethod, HttpResponse, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const BASE_URL: &str = "http://localhost:3001";

/// Vectors never reach the network.
struct Offline;

#[async_trait::async_trait]
impl Transport for Offline {
    async fn send(
        &self,
        _request: kickstart_core::HttpRequest,
    ) -> Result<HttpResponse, kickstart_core::TransportError> {
        panic!("test vectors must not send requests")
    }
}

fn client() -> ApiClient {
    ApiClient::with_credentials(
        ClientConfig::new(BASE_URL).unwrap(),
        Arc::new(Offline),
        Arc::new(Anonymous),
    )
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_array)
        .map(|pairs| {
            pairs
                .iter()
                .map(|pair| {
                    let arr = pair.as_array().unwrap();
                    (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn run_case<E>(c: &ApiClient, case: &Value)
where
    E: Endpoint,
    E::Body: DeserializeOwned,
    E::Response: Serialize,
{
    let name = case["name"].as_str().unwrap();
    let input: E::Body = serde_json::from_value(case.get("input").cloned().unwrap_or(Value::Null)).unwrap();
    let params: Vec<(String, String)> = case
        .get("params")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
                .collect()
        })
        .unwrap_or_default();
    let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let query = string_pairs(case.get("query"));

    // Verify build
    let built = c.build::<E>(&params, &query, &input);
    if let Some(expected) = case.get("expected_build_error") {
        let err = built.unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        let expected: Vec<&str> = expected["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f.as_str().unwrap())
            .collect();
        assert!(matches!(err, ApiError::Validation(_)), "{name}: expected Validation");
        assert_eq!(fields, expected, "{name}: invalid fields");
        return;
    }

    let req = built.unwrap();
    let expected_req = &case["expected_request"];
    assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.path, format!("{BASE_URL}{}", expected_req["path"].as_str().unwrap()), "{name}: path");
    assert_eq!(req.auth, E::CONTRACT.security, "{name}: auth scheme");
    assert_eq!(req.headers, string_pairs(expected_req.get("headers")), "{name}: headers");
    match (&req.body, &expected_req["body"]) {
        (None, Value::Null) => {}
        (Some(body), expected) => {
            let body: Value = serde_json::from_str(body).unwrap();
            assert_eq!(&body, expected, "{name}: body");
            let schema = E::CONTRACT.body.unwrap();
            assert!(schema.check(req.body.as_deref().unwrap()).is_ok(), "{name}: request schema");
        }
        (None, expected) => panic!("{name}: expected body {expected}, built none"),
    }

    // Verify parse
    let sim = &case["simulated_response"];
    let response = HttpResponse::new(
        sim["status"].as_u64().unwrap() as u16,
        sim["body"].as_str().unwrap(),
    );
    let result = c.parse::<E>(response.clone());

    if let Some(expected_error) = case.get("expected_error") {
        let err = match result {
            Ok(_) => panic!("{name}: expected an error"),
            Err(err) => err,
        };
        match expected_error["kind"].as_str().unwrap() {
            "http" => {
                assert_eq!(
                    err.status(),
                    expected_error["status"].as_u64().map(|s| s as u16),
                    "{name}: status"
                );
                assert_eq!(err.message(), expected_error["message"].as_str().unwrap(), "{name}: message");
                let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
                let expected: Vec<&str> = expected_error["fields"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|f| f.as_str().unwrap())
                    .collect();
                assert_eq!(fields, expected, "{name}: field errors");
            }
            "deserialization" => {
                assert!(matches!(err, ApiError::DeserializationError(_)), "{name}: expected DeserializationError");
            }
            other => panic!("{name}: unknown error kind {other}"),
        }
        return;
    }

    let parsed = match result {
        Ok(parsed) => parsed,
        Err(err) => panic!("{name}: parse failed: {err}"),
    };
    assert!(E::CONTRACT.validate_response(&response).is_ok(), "{name}: response schema");
    let parsed = serde_json::to_value(&parsed).unwrap();
    let expected = &case["expected_result"];
    // Round the expected value through the response type so optional fields
    // and timestamp formatting compare the same way.
    let expected: E::Response = serde_json::from_value(expected.clone()).unwrap();
    assert_eq!(parsed, serde_json::to_value(&expected).unwrap(), "{name}: parsed result");
}

fn run_file(raw: &str) {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        match case["operation"].as_str().unwrap() {
            "getHealth" => run_case::<contract::GetHealth>(&c, case),
            "register" => run_case::<contract::Register>(&c, case),
            "login" => run_case::<contract::Login>(&c, case),
            "googleLogin" => run_case::<contract::GoogleLogin>(&c, case),
            "verifyEmail" => run_case::<contract::VerifyEmail>(&c, case),
            "resendVerification" => run_case::<contract::ResendVerification>(&c, case),
            "refresh" => run_case::<contract::Refresh>(&c, case),
            "logout" => run_case::<contract::Logout>(&c, case),
            "logoutAll" => run_case::<contract::LogoutAll>(&c, case),
            "me" => run_case::<contract::Me>(&c, case),
            "getMany" => run_case::<contract::ListUsers>(&c, case),
            "getById" => run_case::<contract::GetUser>(&c, case),
            "store" => run_case::<contract::StoreUser>(&c, case),
            "update" => run_case::<contract::UpdateUser>(&c, case),
            "destroy" => run_case::<contract::DestroyUser>(&c, case),
            "kill" => run_case::<contract::KillUser>(&c, case),
            "restore" => run_case::<contract::RestoreUser>(&c, case),
            other => panic!("unknown operation: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[test]
fn auth_test_vectors() {
    run_file(include_str!("../../test-vectors/auth.json"));
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[test]
fn users_test_vectors() {
    run_file(include_str!("../../test-vectors/users.json"));
}

#[test]
fn every_contract_has_vectors() {
    let raw = [
        include_str!("../../test-vectors/auth.json"),
        include_str!("../../test-vectors/users.json"),
    ];
    let covered: Vec<String> = raw
        .iter()
        .flat_map(|raw| {
            let vectors: Value = serde_json::from_str(raw).unwrap();
            vectors["cases"]
                .as_array()
                .unwrap()
                .iter()
                .map(|case| case["operation"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    for contract in kickstart_core::CONTRACTS {
        assert!(covered.iter().any(|op| op == contract.name), "no vectors for {}", contract.name);
    }
}
