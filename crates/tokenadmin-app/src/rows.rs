// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::columns::{
    ActionCompletion, ActionMethod, CellAction, ListRow, RowClass, TableColumn, single,
};
use crate::ids::{ChallengeId, MachineTokenId};
use crate::model::ViewKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TokenRow {
    pub serial: String,
    pub tokentype: String,
    pub active: bool,
    pub revoked: bool,
    pub locked: bool,
    pub failcount: u32,
    pub maxfail: u32,
    pub description: String,
    pub realms: Vec<String>,
    pub username: String,
    pub user_realm: String,
    pub rollout_state: String,
    pub container_serial: String,
}

impl TokenRow {
    pub fn class(&self) -> RowClass {
        if self.revoked || self.locked || (self.maxfail > 0 && self.failcount >= self.maxfail) {
            RowClass::Alert
        } else if !self.active {
            RowClass::Muted
        } else {
            RowClass::Normal
        }
    }
}

fn token_serial(row: &TokenRow) -> Vec<String> {
    single(&row.serial)
}

fn token_route(row: &TokenRow) -> Option<String> {
    (!row.serial.is_empty()).then(|| format!("/tokens/details/{}", row.serial))
}

fn token_active(row: &TokenRow) -> Vec<String> {
    let state = if row.revoked {
        "revoked"
    } else if row.active {
        "active"
    } else {
        "disabled"
    };
    vec![state.to_owned()]
}

fn toggle_token_active(row: &TokenRow) -> Option<CellAction> {
    if row.revoked || row.serial.is_empty() {
        return None;
    }
    let (verb, path) = if row.active {
        ("disable", "/token/disable")
    } else {
        ("enable", "/token/enable")
    };
    Some(CellAction {
        description: format!("{verb} token {}", row.serial),
        method: ActionMethod::Post,
        path: path.to_owned(),
        body: json!({ "serial": row.serial }),
        completion: ActionCompletion::Refresh,
    })
}

fn token_failcount(row: &TokenRow) -> Vec<String> {
    vec![format!("{} / {}", row.failcount, row.maxfail)]
}

fn reset_failcount(row: &TokenRow) -> Option<CellAction> {
    if row.failcount == 0 {
        return None;
    }
    Some(CellAction {
        description: format!("reset fail counter of {}", row.serial),
        method: ActionMethod::Post,
        path: "/token/reset".to_owned(),
        body: json!({ "serial": row.serial }),
        completion: ActionCompletion::Refresh,
    })
}

fn token_user(row: &TokenRow) -> Vec<String> {
    if row.username.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![row.username.clone()];
    if !row.user_realm.is_empty() {
        lines.push(format!("@{}", row.user_realm));
    }
    lines
}

impl ListRow for TokenRow {
    const VIEW: ViewKind = ViewKind::Tokens;

    fn columns() -> Vec<TableColumn<Self>> {
        vec![
            TableColumn::new("serial", "Serial", token_serial)
                .sortable()
                .router_link(token_route),
            TableColumn::new("tokentype", "Type", |row: &Self| single(&row.tokentype)).sortable(),
            TableColumn::new("active", "Active", token_active)
                .sortable()
                .classed(Self::class)
                .clickable(toggle_token_active),
            TableColumn::new("description", "Description", |row: &Self| {
                single(&row.description)
            })
            .sortable(),
            TableColumn::new("failcount", "Fail counter", token_failcount)
                .sortable()
                .clickable(reset_failcount),
            TableColumn::new("rollout_state", "Rollout", |row: &Self| {
                single(&row.rollout_state)
            })
            .sortable(),
            TableColumn::new("username", "User", token_user),
            TableColumn::new("realms", "Realms", |row: &Self| row.realms.clone()),
            TableColumn::new("container_serial", "Container", |row: &Self| {
                single(&row.container_serial)
            }),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContainerUser {
    pub user_name: String,
    pub user_realm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContainerToken {
    pub serial: String,
    pub tokentype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContainerRow {
    pub serial: String,
    #[serde(rename = "type")]
    pub container_type: String,
    pub description: String,
    pub states: Vec<String>,
    pub realms: Vec<String>,
    pub users: Vec<ContainerUser>,
    pub tokens: Vec<ContainerToken>,
}

impl ContainerRow {
    pub fn is_disabled(&self) -> bool {
        self.states.iter().any(|state| state == "disabled")
    }
}

fn toggle_container_state(row: &ContainerRow) -> Option<CellAction> {
    if row.serial.is_empty() {
        return None;
    }
    let target = if row.is_disabled() { "active" } else { "disabled" };
    Some(CellAction {
        description: format!("set container {} {target}", row.serial),
        method: ActionMethod::Post,
        path: format!("/container/{}/states", row.serial),
        body: json!({ "states": target }),
        completion: ActionCompletion::Refresh,
    })
}

impl ListRow for ContainerRow {
    const VIEW: ViewKind = ViewKind::Containers;

    fn columns() -> Vec<TableColumn<Self>> {
        vec![
            TableColumn::new("serial", "Serial", |row: &Self| single(&row.serial))
                .sortable()
                .router_link(|row: &Self| {
                    (!row.serial.is_empty()).then(|| format!("/containers/details/{}", row.serial))
                }),
            TableColumn::new("type", "Type", |row: &Self| single(&row.container_type)).sortable(),
            TableColumn::new("states", "States", |row: &Self| row.states.clone())
                .classed(|row: &Self| {
                    if row.is_disabled() {
                        RowClass::Muted
                    } else {
                        RowClass::Normal
                    }
                })
                .clickable(toggle_container_state),
            TableColumn::new("description", "Description", |row: &Self| {
                single(&row.description)
            }),
            TableColumn::new("users", "Users", |row: &Self| {
                row.users
                    .iter()
                    .map(|user| format!("{}@{}", user.user_name, user.user_realm))
                    .collect()
            }),
            TableColumn::new("realms", "Realms", |row: &Self| row.realms.clone()),
            TableColumn::new("tokens", "Tokens", |row: &Self| {
                row.tokens.iter().map(|token| token.serial.clone()).collect()
            }),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MachineTokenRow {
    pub id: MachineTokenId,
    pub serial: String,
    pub application: String,
    pub hostname: String,
    pub machine_id: String,
    pub resolver_name: String,
    pub service_id: String,
}

fn unassign_machine_token(row: &MachineTokenRow) -> Option<CellAction> {
    if row.serial.is_empty() || row.application.is_empty() {
        return None;
    }
    Some(CellAction {
        description: format!("detach {} from {}", row.serial, row.application),
        method: ActionMethod::Delete,
        path: format!("/machine/token/{}/{}/{}", row.serial, row.application, row.id),
        body: serde_json::Value::Null,
        completion: ActionCompletion::Refresh,
    })
}

impl ListRow for MachineTokenRow {
    const VIEW: ViewKind = ViewKind::MachineTokens;

    fn columns() -> Vec<TableColumn<Self>> {
        vec![
            TableColumn::new("serial", "Serial", |row: &Self| single(&row.serial))
                .sortable()
                .router_link(|row: &Self| {
                    (!row.serial.is_empty()).then(|| format!("/tokens/details/{}", row.serial))
                }),
            TableColumn::new("application", "Application", |row: &Self| {
                single(&row.application)
            }),
            TableColumn::new("hostname", "Host", |row: &Self| single(&row.hostname)),
            TableColumn::new("service_id", "Service", |row: &Self| single(&row.service_id)),
            TableColumn::new("machine_id", "Machine", |row: &Self| single(&row.machine_id)),
            TableColumn::new("resolver_name", "Resolver", |row: &Self| {
                single(&row.resolver_name)
            }),
            TableColumn::new("unassign", "", |_: &Self| vec!["unassign".to_owned()])
                .clickable(unassign_machine_token),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChallengeRow {
    pub id: ChallengeId,
    pub serial: String,
    pub transaction_id: String,
    pub timestamp: String,
    pub expiration: String,
    pub otp_received: bool,
    pub received_count: u32,
}

impl ListRow for ChallengeRow {
    const VIEW: ViewKind = ViewKind::Challenges;

    fn columns() -> Vec<TableColumn<Self>> {
        vec![
            TableColumn::new("timestamp", "Created", |row: &Self| single(&row.timestamp))
                .sortable(),
            TableColumn::new("serial", "Serial", |row: &Self| single(&row.serial))
                .sortable()
                .router_link(|row: &Self| {
                    (!row.serial.is_empty()).then(|| format!("/tokens/details/{}", row.serial))
                }),
            TableColumn::new("transaction_id", "Transaction", |row: &Self| {
                single(&row.transaction_id)
            })
            .sortable(),
            TableColumn::new("expiration", "Expires", |row: &Self| single(&row.expiration)),
            TableColumn::new("otp_received", "Answered", |row: &Self| {
                vec![if row.otp_received { "yes" } else { "no" }.to_owned()]
            })
            .classed(|row: &Self| {
                if row.otp_received {
                    RowClass::Muted
                } else {
                    RowClass::Normal
                }
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{ChallengeRow, ContainerRow, MachineTokenRow, TokenRow};
    use crate::{ActionCompletion, ActionMethod, ListRow, RowClass};

    fn token() -> TokenRow {
        TokenRow {
            serial: "OATH0001".to_owned(),
            tokentype: "hotp".to_owned(),
            active: true,
            maxfail: 10,
            realms: vec!["corp".to_owned(), "lab".to_owned()],
            username: "alice".to_owned(),
            user_realm: "corp".to_owned(),
            ..TokenRow::default()
        }
    }

    #[test]
    fn token_rows_decode_with_missing_fields() {
        let row: TokenRow = serde_json::from_value(serde_json::json!({
            "serial": "OATH0001",
            "active": false,
            "info": { "hashlib": "sha1" }
        }))
        .expect("decode");
        assert_eq!(row.serial, "OATH0001");
        assert!(!row.active);
        assert!(row.realms.is_empty());
    }

    #[test]
    fn token_serial_links_to_details() {
        let column = TokenRow::find_column("serial").expect("serial column");
        assert_eq!(
            column.route(&token()).as_deref(),
            Some("/tokens/details/OATH0001")
        );
    }

    #[test]
    fn active_cell_toggles_enable_state() {
        let column = TokenRow::find_column("active").expect("active column");
        let action = column.activate(&token()).expect("action");
        assert_eq!(action.path, "/token/disable");
        assert_eq!(action.method, ActionMethod::Post);
        assert_eq!(action.completion, ActionCompletion::Refresh);
        assert_eq!(action.body["serial"], "OATH0001");

        let disabled = TokenRow {
            active: false,
            ..token()
        };
        assert_eq!(
            column.activate(&disabled).map(|action| action.path),
            Some("/token/enable".to_owned())
        );
        assert_eq!(column.row_class(&disabled), RowClass::Muted);

        let revoked = TokenRow {
            revoked: true,
            ..token()
        };
        assert_eq!(column.activate(&revoked), None);
        assert_eq!(column.row_class(&revoked), RowClass::Alert);
    }

    #[test]
    fn failcount_reset_only_when_nonzero() {
        let column = TokenRow::find_column("failcount").expect("failcount column");
        assert_eq!(column.activate(&token()), None);
        let failing = TokenRow {
            failcount: 10,
            ..token()
        };
        assert_eq!(
            column.activate(&failing).map(|action| action.path),
            Some("/token/reset".to_owned())
        );
        assert_eq!(failing.class(), RowClass::Alert);
    }

    #[test]
    fn multi_value_cells_render_one_line_each() {
        let realms = TokenRow::find_column("realms").expect("realms column");
        assert_eq!(realms.display_items(&token()), vec!["corp", "lab"]);
        let user = TokenRow::find_column("username").expect("user column");
        assert_eq!(user.display_items(&token()), vec!["alice", "@corp"]);
    }

    #[test]
    fn token_sortable_keys() {
        let keys = TokenRow::sortable_keys();
        assert!(keys.contains(&"serial"));
        assert!(keys.contains(&"description"));
        assert!(!keys.contains(&"realms"));
    }

    #[test]
    fn container_state_click_flips_disabled() {
        let row: ContainerRow = serde_json::from_value(serde_json::json!({
            "serial": "SMPH0001",
            "type": "smartphone",
            "states": ["active"],
            "users": [{ "user_name": "bob", "user_realm": "corp" }]
        }))
        .expect("decode");
        assert_eq!(row.container_type, "smartphone");

        let states = ContainerRow::find_column("states").expect("states column");
        let action = states.activate(&row).expect("action");
        assert_eq!(action.path, "/container/SMPH0001/states");
        assert_eq!(action.body["states"], "disabled");

        let users = ContainerRow::find_column("users").expect("users column");
        assert_eq!(users.display_items(&row), vec!["bob@corp"]);
    }

    #[test]
    fn machine_token_unassign_is_delete() {
        let row: MachineTokenRow = serde_json::from_value(serde_json::json!({
            "id": 4,
            "serial": "SSHK0001",
            "application": "ssh",
            "hostname": "bastion"
        }))
        .expect("decode");
        let column = MachineTokenRow::find_column("unassign").expect("unassign column");
        let action = column.activate(&row).expect("action");
        assert_eq!(action.method, ActionMethod::Delete);
        assert_eq!(action.path, "/machine/token/SSHK0001/ssh/4");
    }

    #[test]
    fn challenge_rows_decode() {
        let row: ChallengeRow = serde_json::from_value(serde_json::json!({
            "id": 12,
            "serial": "PIEM0001",
            "transaction_id": "0123",
            "otp_received": true
        }))
        .expect("decode");
        assert_eq!(row.id.get(), 12);
        let answered = ChallengeRow::find_column("otp_received").expect("column");
        assert_eq!(answered.display_items(&row), vec!["yes"]);
        assert_eq!(answered.row_class(&row), RowClass::Muted);
    }
}
