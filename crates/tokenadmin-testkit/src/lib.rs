// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tokenadmin_app::{
    ChallengeId, ChallengeRow, ContainerRow, ContainerToken, ContainerUser, IssuedRequest,
    ListFetcher, MachineTokenId, MachineTokenRow, TokenRow, ViewKind,
};

const TOKEN_TYPES: [&str; 6] = ["hotp", "totp", "spass", "email", "sms", "registration"];
const SERIAL_PREFIXES: [&str; 6] = ["OATH", "TOTP", "PISP", "PIEM", "PISM", "REG"];
const CONTAINER_TYPES: [&str; 3] = ["generic", "smartphone", "yubikey"];
const REALMS: [&str; 4] = ["corp", "lab", "partners", "ops"];
const USERS: [&str; 12] = [
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy", "mallory",
    "oscar",
];
const HOSTS: [&str; 6] = ["bastion", "gitlab", "vpn-gw", "build01", "db02", "jump"];
const DESCRIPTION_WORDS: [&str; 16] = [
    "laptop", "phone", "backup", "vpn", "office", "travel", "yubikey", "spare", "admin", "ssh",
    "login", "service", "kiosk", "shared", "primary", "legacy",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator for realistic list rows.
#[derive(Debug, Clone)]
pub struct TokenFaker {
    rng: DeterministicRng,
    counter: u32,
}

impl TokenFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            counter: 0,
        }
    }

    pub fn token(&mut self) -> TokenRow {
        let kind = self.rng.int_n(TOKEN_TYPES.len());
        let assigned = self.rng.bool();
        let maxfail = 10;
        let failcount = if self.rng.int_n(5) == 0 {
            self.rng.int_n(maxfail as usize + 1) as u32
        } else {
            0
        };
        let (username, user_realm, realms) = if assigned {
            let realm = self.pick(&REALMS).to_owned();
            (self.pick(&USERS).to_owned(), realm.clone(), vec![realm])
        } else {
            (String::new(), String::new(), Vec::new())
        };

        TokenRow {
            serial: self.serial(SERIAL_PREFIXES[kind]),
            tokentype: TOKEN_TYPES[kind].to_owned(),
            active: self.rng.int_n(4) != 0,
            revoked: false,
            locked: false,
            failcount,
            maxfail,
            description: self.description(),
            realms,
            username,
            user_realm,
            rollout_state: String::new(),
            container_serial: String::new(),
        }
    }

    pub fn container(&mut self) -> ContainerRow {
        let token_count = 1 + self.rng.int_n(3);
        let tokens = (0..token_count)
            .map(|_| {
                let token = self.token();
                ContainerToken {
                    serial: token.serial,
                    tokentype: token.tokentype,
                }
            })
            .collect();
        let realm = self.pick(&REALMS).to_owned();
        let states = if self.rng.int_n(4) == 0 {
            vec!["disabled".to_owned()]
        } else {
            vec!["active".to_owned()]
        };

        ContainerRow {
            serial: self.serial("CONT"),
            container_type: self.pick(&CONTAINER_TYPES).to_owned(),
            description: self.description(),
            states,
            realms: vec![realm.clone()],
            users: vec![ContainerUser {
                user_name: self.pick(&USERS).to_owned(),
                user_realm: realm,
            }],
            tokens,
        }
    }

    pub fn machine_token(&mut self) -> MachineTokenRow {
        let id = i64::from(self.next_counter());
        let hostname = self.pick(&HOSTS).to_owned();
        MachineTokenRow {
            id: MachineTokenId::new(id),
            serial: self.serial("SSHK"),
            application: "ssh".to_owned(),
            machine_id: String::new(),
            resolver_name: String::new(),
            service_id: format!("{hostname}-sshd"),
            hostname,
        }
    }

    pub fn challenge(&mut self) -> ChallengeRow {
        let id = i64::from(self.next_counter());
        ChallengeRow {
            id: ChallengeId::new(id),
            serial: self.serial("PIEM"),
            transaction_id: format!("{:020}", self.rng.next_u64()),
            timestamp: format!(
                "2026-03-{:02}T09:{:02}:00",
                1 + self.rng.int_n(28),
                self.rng.int_n(60)
            ),
            expiration: String::new(),
            otp_received: self.rng.bool(),
            received_count: 0,
        }
    }

    pub fn tokens(&mut self, count: usize) -> Vec<TokenRow> {
        (0..count).map(|_| self.token()).collect()
    }

    fn next_counter(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    fn serial(&mut self, prefix: &str) -> String {
        let number = self.next_counter();
        format!("{prefix}{number:08X}")
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn description(&mut self) -> String {
        let count = 1 + self.rng.int_n(3);
        (0..count)
            .map(|_| self.pick(&DESCRIPTION_WORDS))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A successful list response in the server's envelope.
pub fn list_body<T: Serialize>(view: ViewKind, items: &[T], count: usize) -> Value {
    json!({
        "result": {
            "status": true,
            "value": {
                (view.items_key()): items,
                "count": count,
            }
        }
    })
}

pub fn error_body(code: i64, message: &str) -> Value {
    json!({
        "result": {
            "status": false,
            "error": { "code": code, "message": message }
        }
    })
}

pub fn value_body(value: Value) -> Value {
    json!({ "result": { "status": true, "value": value } })
}

/// Captures every issued request so tests can complete them in any order.
#[derive(Debug, Clone, Default)]
pub struct RecordingFetcher {
    issued: Rc<RefCell<Vec<IssuedRequest>>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the log; stays valid after the fetcher moves into a
    /// controller.
    pub fn log(&self) -> Rc<RefCell<Vec<IssuedRequest>>> {
        Rc::clone(&self.issued)
    }

    pub fn issued(&self) -> Vec<IssuedRequest> {
        self.issued.borrow().clone()
    }

    pub fn last(&self) -> Option<IssuedRequest> {
        self.issued.borrow().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.issued.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.borrow().is_empty()
    }
}

impl ListFetcher for RecordingFetcher {
    fn fetch(&mut self, issued: &IssuedRequest) {
        self.issued.borrow_mut().push(issued.clone());
    }
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}

#[cfg(test)]
mod tests {
    use super::{RecordingFetcher, TokenFaker, error_body, list_body};
    use std::collections::BTreeSet;
    use tokenadmin_app::{
        IssuedRequest, ListFetcher, ListRequest, RequestId, TokenRow, ViewKind,
    };

    #[test]
    fn faker_is_deterministic_per_seed() {
        let mut left = TokenFaker::new(42);
        let mut right = TokenFaker::new(42);
        assert_eq!(left.tokens(5), right.tokens(5));
    }

    #[test]
    fn serials_are_unique() {
        let mut faker = TokenFaker::new(7);
        let serials: BTreeSet<String> = faker.tokens(50).into_iter().map(|t| t.serial).collect();
        assert_eq!(serials.len(), 50);
    }

    #[test]
    fn assigned_tokens_carry_user_and_realm() {
        let mut faker = TokenFaker::new(3);
        for token in faker.tokens(30) {
            assert!(!token.tokentype.is_empty());
            assert!(token.failcount <= token.maxfail);
            if !token.username.is_empty() {
                assert_eq!(token.realms, vec![token.user_realm.clone()]);
            }
        }
    }

    #[test]
    fn other_rows_are_populated() {
        let mut faker = TokenFaker::new(9);
        let container = faker.container();
        assert!(!container.tokens.is_empty());
        assert_eq!(container.users.len(), 1);
        let machine = faker.machine_token();
        assert_eq!(machine.application, "ssh");
        assert!(machine.id.get() > 0);
        let challenge = faker.challenge();
        assert_eq!(challenge.transaction_id.len(), 20);
    }

    #[test]
    fn list_body_uses_view_items_key() {
        let mut faker = TokenFaker::new(1);
        let tokens = faker.tokens(2);
        let body = list_body(ViewKind::MachineTokens, &tokens, 9);
        assert_eq!(body["result"]["value"]["count"], 9);
        let items: Vec<TokenRow> =
            serde_json::from_value(body["result"]["value"]["tokens"].clone()).expect("decode");
        assert_eq!(items, tokens);

        let error = error_body(4033, "denied");
        assert_eq!(error["result"]["status"], false);
        assert_eq!(error["result"]["error"]["message"], "denied");
    }

    #[test]
    fn recording_fetcher_shares_its_log() {
        let fetcher = RecordingFetcher::new();
        let log = fetcher.log();
        let mut moved = fetcher.clone();
        moved.fetch(&IssuedRequest {
            id: RequestId::new(1),
            request: ListRequest::first_page(15),
        });
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(fetcher.len(), 1);
        assert_eq!(fetcher.last().map(|issued| issued.id), Some(RequestId::new(1)));
    }
}
