//! Contract references and the request vocabulary sent to the backend.
//!
//! Addresses are validated here, locally, so that a malformed address
//! never costs a network round trip.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of hex digits that follow the `0x` prefix.
const ADDRESS_HEX_LEN: usize = 40;

/// A validated EVM contract address (`0x` + 40 hex digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    /// Parse and validate an address. The input must match exactly; any
    /// whitespace makes it invalid.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyAddress);
        }

        let digits = raw
            .strip_prefix("0x")
            .ok_or_else(|| ValidationError::InvalidAddress(raw.to_string()))?;

        if digits.len() != ADDRESS_HEX_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidAddress(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    /// Shortened form for progress lines, e.g. `0x1234…7890`.
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl FromStr for ContractAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContractAddress> for String {
    fn from(address: ContractAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target network for the contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Avalanche C-Chain mainnet
    #[default]
    Mainnet,
    /// Fuji testnet
    Fuji,
    /// Local development node
    Local,
}

impl Network {
    /// Identifier the backend expects in request bodies.
    pub fn identifier(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Fuji => "testnet",
            Network::Local => "local",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "Avalanche Mainnet"),
            Network::Fuji => write!(f, "Fuji"),
            Network::Local => write!(f, "Local"),
        }
    }
}

impl FromStr for Network {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "avalanche mainnet" => Ok(Network::Mainnet),
            "fuji" | "testnet" | "fuji testnet" => Ok(Network::Fuji),
            "local" | "local network" => Ok(Network::Local),
            other => Err(ValidationError::UnknownNetwork(other.to_string())),
        }
    }
}

/// A named check category requested for a job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Analyzer {
    StaticAnalysis,
    SymbolicExecution,
    ChainSpecificRules,
    GasAnalysis,
}

impl Analyzer {
    /// Identifier the backend expects in the `analyzers` list.
    pub fn identifier(&self) -> &'static str {
        match self {
            Analyzer::StaticAnalysis => "slither",
            Analyzer::SymbolicExecution => "mythril",
            Analyzer::ChainSpecificRules => "custom",
            Analyzer::GasAnalysis => "gas analysis",
        }
    }
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analyzer::StaticAnalysis => write!(f, "static-analysis"),
            Analyzer::SymbolicExecution => write!(f, "symbolic-execution"),
            Analyzer::ChainSpecificRules => write!(f, "chain-specific-rules"),
            Analyzer::GasAnalysis => write!(f, "gas-analysis"),
        }
    }
}

impl FromStr for Analyzer {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static-analysis" | "static" | "slither" => Ok(Analyzer::StaticAnalysis),
            "symbolic-execution" | "symbolic" | "mythril" => Ok(Analyzer::SymbolicExecution),
            "chain-specific-rules" | "chain" | "avalanche" | "custom" => {
                Ok(Analyzer::ChainSpecificRules)
            }
            "gas-analysis" | "gas" | "gas analysis" => Ok(Analyzer::GasAnalysis),
            other => Err(ValidationError::UnknownAnalyzer(other.to_string())),
        }
    }
}

/// Non-empty, de-duplicated set of analyzers in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Analyzer>", into = "Vec<Analyzer>")]
pub struct AnalyzerSet(Vec<Analyzer>);

impl AnalyzerSet {
    pub fn new(analyzers: impl IntoIterator<Item = Analyzer>) -> Result<Self, ValidationError> {
        let mut list: Vec<Analyzer> = analyzers.into_iter().collect();
        list.sort();
        list.dedup();

        if list.is_empty() {
            return Err(ValidationError::NoAnalyzers);
        }

        Ok(Self(list))
    }

    /// Backend identifiers, in canonical order.
    pub fn identifiers(&self) -> Vec<String> {
        self.0.iter().map(|a| a.identifier().to_string()).collect()
    }
}

impl Default for AnalyzerSet {
    fn default() -> Self {
        Self(vec![
            Analyzer::StaticAnalysis,
            Analyzer::SymbolicExecution,
            Analyzer::ChainSpecificRules,
        ])
    }
}

impl TryFrom<Vec<Analyzer>> for AnalyzerSet {
    type Error = ValidationError;

    fn try_from(value: Vec<Analyzer>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AnalyzerSet> for Vec<Analyzer> {
    fn from(set: AnalyzerSet) -> Self {
        set.0
    }
}

impl fmt::Display for AnalyzerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Scheduling priority attached to a start-audit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// An uploaded contract source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBundle {
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl SourceBundle {
    pub fn new(file_name: impl Into<String>, contents: Vec<u8>) -> Result<Self, ValidationError> {
        let file_name = file_name.into();
        if contents.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ValidationError::EmptySource(file_name));
        }
        Ok(Self {
            file_name,
            contents,
        })
    }
}

/// What is being submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractRef {
    Address(ContractAddress),
    Source(SourceBundle),
}

impl ContractRef {
    /// Validate a raw address string into a contract reference.
    #[cfg(test)]
    pub fn address(raw: &str) -> Result<Self, ValidationError> {
        ContractAddress::parse(raw).map(ContractRef::Address)
    }

    /// Human-readable label used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            ContractRef::Address(address) => address.to_string(),
            ContractRef::Source(bundle) => bundle.file_name.clone(),
        }
    }
}
