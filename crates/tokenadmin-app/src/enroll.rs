// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Body of a `/token/init` request.
pub type EnrollParams = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Hotp,
    Totp,
    Spass,
    Email,
    Sms,
    Registration,
}

impl TokenType {
    pub const ALL: [Self; 6] = [
        Self::Hotp,
        Self::Totp,
        Self::Spass,
        Self::Email,
        Self::Sms,
        Self::Registration,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hotp => "hotp",
            Self::Totp => "totp",
            Self::Spass => "spass",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Registration => "registration",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User input for a new token. Type-specific values live in `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnrollForm {
    pub description: String,
    pub user: String,
    pub realm: String,
    pub pin: String,
    pub fields: BTreeMap<String, String>,
}

impl EnrollForm {
    /// Builds a form from `key=value` pairs; the common keys fill the named
    /// fields, everything else goes to `fields`.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            let value = value.to_owned();
            match key {
                "description" => form.description = value,
                "user" => form.user = value,
                "realm" => form.realm = value,
                "pin" => form.pin = value,
                other => {
                    form.fields.insert(other.to_owned(), value);
                }
            }
        }
        form
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollError {
    UnknownType(String),
    Missing {
        token_type: TokenType,
        field: &'static str,
    },
    Invalid {
        field: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },
    RealmWithoutUser,
}

impl fmt::Display for EnrollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(name) => write!(
                f,
                "unknown token type {name:?} -- choose one of hotp, totp, spass, email, sms, registration"
            ),
            Self::Missing { token_type, field } => write!(
                f,
                "{token_type} tokens need {field} -- pass {field}=<value> and retry"
            ),
            Self::Invalid {
                field,
                value,
                allowed,
            } => write!(
                f,
                "{field} {value:?} is not supported -- use one of {}",
                allowed.join(", ")
            ),
            Self::RealmWithoutUser => {
                f.write_str("realm was given without a user -- add user=<name> or drop the realm")
            }
        }
    }
}

impl std::error::Error for EnrollError {}

/// A parameter a token type reads from the form, for help output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParam {
    pub key: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
}

impl ConfigParam {
    const fn required(key: &'static str) -> Self {
        Self {
            key,
            required: true,
            default: None,
        }
    }

    const fn optional(key: &'static str, default: Option<&'static str>) -> Self {
        Self {
            key,
            required: false,
            default,
        }
    }
}

pub trait TokenTypeStrategy {
    fn token_type(&self) -> TokenType;

    fn config_params(&self) -> Vec<ConfigParam>;

    /// Adds the type-specific parameters to `params`.
    fn build_enroll_params(
        &self,
        form: &EnrollForm,
        params: &mut EnrollParams,
    ) -> Result<(), EnrollError>;
}

const HASHLIBS: &[&str] = &["sha1", "sha256", "sha512"];
const OTP_LENGTHS: &[&str] = &["6", "8"];
const TIME_STEPS: &[&str] = &["30", "60"];

fn choice(
    form: &EnrollForm,
    field: &'static str,
    allowed: &'static [&'static str],
    default: &str,
) -> Result<String, EnrollError> {
    let value = form.field(field).unwrap_or(default).to_ascii_lowercase();
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(EnrollError::Invalid {
            field,
            value,
            allowed,
        })
    }
}

fn required(
    form: &EnrollForm,
    token_type: TokenType,
    field: &'static str,
) -> Result<String, EnrollError> {
    form.field(field)
        .map(str::to_owned)
        .ok_or(EnrollError::Missing { token_type, field })
}

fn otp_secret(form: &EnrollForm, params: &mut EnrollParams) {
    match form.field("otpkey") {
        Some(key) => {
            params.insert("otpkey".to_owned(), Value::from(key));
        }
        None => {
            params.insert("genkey".to_owned(), Value::from(true));
        }
    }
}

struct HotpStrategy;

impl TokenTypeStrategy for HotpStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Hotp
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        vec![
            ConfigParam::optional("otpkey", None),
            ConfigParam::optional("otplen", Some("6")),
            ConfigParam::optional("hashlib", Some("sha1")),
        ]
    }

    fn build_enroll_params(
        &self,
        form: &EnrollForm,
        params: &mut EnrollParams,
    ) -> Result<(), EnrollError> {
        otp_secret(form, params);
        params.insert(
            "otplen".to_owned(),
            Value::from(choice(form, "otplen", OTP_LENGTHS, "6")?),
        );
        params.insert(
            "hashlib".to_owned(),
            Value::from(choice(form, "hashlib", HASHLIBS, "sha1")?),
        );
        Ok(())
    }
}

struct TotpStrategy;

impl TokenTypeStrategy for TotpStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Totp
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        let mut params = HotpStrategy.config_params();
        params.push(ConfigParam::optional("timeStep", Some("30")));
        params
    }

    fn build_enroll_params(
        &self,
        form: &EnrollForm,
        params: &mut EnrollParams,
    ) -> Result<(), EnrollError> {
        HotpStrategy.build_enroll_params(form, params)?;
        params.insert(
            "timeStep".to_owned(),
            Value::from(choice(form, "timeStep", TIME_STEPS, "30")?),
        );
        Ok(())
    }
}

struct SpassStrategy;

impl TokenTypeStrategy for SpassStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Spass
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        vec![ConfigParam::required("pin")]
    }

    fn build_enroll_params(
        &self,
        form: &EnrollForm,
        _params: &mut EnrollParams,
    ) -> Result<(), EnrollError> {
        if form.pin.is_empty() {
            return Err(EnrollError::Missing {
                token_type: TokenType::Spass,
                field: "pin",
            });
        }
        Ok(())
    }
}

struct EmailStrategy;

impl TokenTypeStrategy for EmailStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Email
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        vec![ConfigParam::required("email")]
    }

    fn build_enroll_params(
        &self,
        form: &EnrollForm,
        params: &mut EnrollParams,
    ) -> Result<(), EnrollError> {
        let email = required(form, TokenType::Email, "email")?;
        if !email.contains('@') {
            return Err(EnrollError::Invalid {
                field: "email",
                value: email,
                allowed: &["an address containing @"],
            });
        }
        params.insert("email".to_owned(), Value::from(email));
        params.insert("genkey".to_owned(), Value::from(true));
        Ok(())
    }
}

struct SmsStrategy;

impl TokenTypeStrategy for SmsStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Sms
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        vec![ConfigParam::required("phone")]
    }

    fn build_enroll_params(
        &self,
        form: &EnrollForm,
        params: &mut EnrollParams,
    ) -> Result<(), EnrollError> {
        let phone = required(form, TokenType::Sms, "phone")?;
        params.insert("phone".to_owned(), Value::from(phone));
        params.insert("genkey".to_owned(), Value::from(true));
        Ok(())
    }
}

struct RegistrationStrategy;

impl TokenTypeStrategy for RegistrationStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Registration
    }

    fn config_params(&self) -> Vec<ConfigParam> {
        Vec::new()
    }

    fn build_enroll_params(
        &self,
        _form: &EnrollForm,
        params: &mut EnrollParams,
    ) -> Result<(), EnrollError> {
        params.insert("genkey".to_owned(), Value::from(true));
        Ok(())
    }
}

/// Token types the client can enroll, keyed by type tag.
#[derive(Default)]
pub struct TokenTypeRegistry {
    strategies: BTreeMap<TokenType, Box<dyn TokenTypeStrategy>>,
}

impl TokenTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HotpStrategy));
        registry.register(Box::new(TotpStrategy));
        registry.register(Box::new(SpassStrategy));
        registry.register(Box::new(EmailStrategy));
        registry.register(Box::new(SmsStrategy));
        registry.register(Box::new(RegistrationStrategy));
        registry
    }

    /// Registers `strategy`, replacing any earlier one for the same type.
    pub fn register(&mut self, strategy: Box<dyn TokenTypeStrategy>) {
        self.strategies.insert(strategy.token_type(), strategy);
    }

    pub fn get(&self, token_type: TokenType) -> Option<&dyn TokenTypeStrategy> {
        self.strategies.get(&token_type).map(|strategy| &**strategy)
    }

    pub fn types(&self) -> impl Iterator<Item = TokenType> + '_ {
        self.strategies.keys().copied()
    }

    /// Validates `form` and builds the `/token/init` body for `type_name`.
    pub fn enroll(&self, type_name: &str, form: &EnrollForm) -> Result<EnrollParams, EnrollError> {
        let strategy = TokenType::parse(type_name)
            .and_then(|token_type| self.get(token_type))
            .ok_or_else(|| EnrollError::UnknownType(type_name.to_owned()))?;

        if !form.realm.is_empty() && form.user.is_empty() {
            return Err(EnrollError::RealmWithoutUser);
        }

        let mut params = EnrollParams::new();
        params.insert(
            "type".to_owned(),
            Value::from(strategy.token_type().as_str()),
        );
        for (key, value) in [
            ("description", &form.description),
            ("user", &form.user),
            ("realm", &form.realm),
            ("pin", &form.pin),
        ] {
            if !value.is_empty() {
                params.insert(key.to_owned(), Value::from(value.as_str()));
            }
        }
        strategy.build_enroll_params(form, &mut params)?;
        Ok(params)
    }
}
