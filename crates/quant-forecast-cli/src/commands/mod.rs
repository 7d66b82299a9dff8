pub mod correlation;
pub mod forecast;
pub mod portfolio;
pub mod returns;
pub mod risk;
pub mod simulate;
pub mod valuation;

use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

use quant_forecast_core::returns::series::{ReturnFrequency, ReturnKind};

use crate::input;

pub type CommandResult = Result<Value, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FrequencyArg {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl From<FrequencyArg> for ReturnFrequency {
    fn from(f: FrequencyArg) -> Self {
        match f {
            FrequencyArg::Daily => ReturnFrequency::Daily,
            FrequencyArg::Weekly => ReturnFrequency::Weekly,
            FrequencyArg::Monthly => ReturnFrequency::Monthly,
            FrequencyArg::Quarterly => ReturnFrequency::Quarterly,
            FrequencyArg::Annual => ReturnFrequency::Annual,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Simple,
    Log,
}

impl From<KindArg> for ReturnKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Simple => ReturnKind::Simple,
            KindArg::Log => ReturnKind::Log,
        }
    }
}

/// JSON from `--input`, else from piped stdin, else `None`.
pub fn load_json_value(path: Option<&Path>) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(Some(input::file::read_json_value(p)?)),
        None => input::stdin::read_stdin(),
    }
}

/// Typed variant of [`load_json_value`].
pub fn load_json<T: DeserializeOwned>(
    path: Option<&Path>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(Some(input::file::read_json(p)?)),
        None => match input::stdin::read_stdin()? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        },
    }
}

/// Layers config defaults and flag overrides onto a JSON input object.
///
/// A default is written only when the key is absent; an override always wins.
pub struct InputLayer<'a> {
    object: &'a mut Map<String, Value>,
}

impl<'a> InputLayer<'a> {
    pub fn new(value: &'a mut Value) -> Result<Self, Box<dyn std::error::Error>> {
        match value {
            Value::Object(object) => Ok(Self { object }),
            _ => Err("JSON input must be an object".into()),
        }
    }

    pub fn default_to(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.object.entry(key).or_insert_with(|| value.into());
        self
    }

    pub fn default_opt<T: Into<Value>>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.default_to(key, v);
        }
        self
    }

    pub fn set_opt<T: Into<Value>>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.object.insert(key.to_string(), v.into());
        }
        self
    }
}

/// Build the JSON envelope for a command and append CLI-side warnings.
pub fn envelope<T: serde::Serialize>(output: T, extra_warnings: Vec<String>) -> CommandResult {
    let mut value = serde_json::to_value(output)?;
    if !extra_warnings.is_empty() {
        if let Some(Value::Array(warnings)) = value.get_mut("warnings") {
            warnings.extend(extra_warnings.into_iter().map(Value::String));
        }
    }
    Ok(value)
}
