use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONTRACT_NAME: &str = "ProductRecord";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("{field} must be a base-10 integer within int256 range, got '{value}'")]
    Integer { field: &'static str, value: String },
    #[error("{field} must be 'true' or 'false', got '{value}'")]
    Boolean { field: &'static str, value: String },
}

/// On-chain type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int256,
    Bool,
}

impl FieldType {
    pub fn solidity(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int256 => "int256",
            FieldType::Bool => "bool",
        }
    }

    /// Constructor parameters of dynamic types need a data location.
    fn param_decl(&self, name: &str) -> String {
        match self {
            FieldType::String => format!("string memory _{}", name),
            other => format!("{} _{}", other.solidity(), name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    /// First four bytes of keccak256 of the getter signature, e.g. `price()`.
    pub selector: [u8; 4],
}

/// Declaration order is constructor order.
pub const FIELDS: [FieldSpec; 4] = [
    FieldSpec { name: "productId", ty: FieldType::String, selector: [0xc5, 0xce, 0x39, 0x11] },
    FieldSpec { name: "productName", ty: FieldType::String, selector: [0x7f, 0x76, 0x50, 0xeb] },
    FieldSpec { name: "price", ty: FieldType::Int256, selector: [0xa0, 0x35, 0xb1, 0xfe] },
    FieldSpec { name: "isAvailable", ty: FieldType::Bool, selector: [0x85, 0x6c, 0x71, 0xdd] },
];

/// Untyped constructor values as the operator typed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValues {
    pub product_id: String,
    pub product_name: String,
    pub price: String,
    pub is_available: String,
}

impl RawValues {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        price: impl Into<String>,
        is_available: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            price: price.into(),
            is_available: is_available.into(),
        }
    }
}

/// The typed creation signature of a record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecordValues {
    pub product_id: String,
    pub product_name: String,
    #[serde(with = "decimal")]
    pub price: BigInt,
    pub is_available: bool,
}

impl RecordValues {
    /// Converts operator text into typed values. Strings are taken as-is.
    pub fn parse(raw: &RawValues) -> Result<Self, ArgumentError> {
        let price = raw
            .price
            .trim()
            .parse::<BigInt>()
            .ok()
            .filter(fits_int256)
            .ok_or_else(|| ArgumentError::Integer {
                field: "price",
                value: raw.price.clone(),
            })?;

        let is_available = match raw.is_available.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                return Err(ArgumentError::Boolean {
                    field: "is_available",
                    value: raw.is_available.clone(),
                });
            }
        };

        Ok(Self {
            product_id: raw.product_id.clone(),
            product_name: raw.product_name.clone(),
            price,
            is_available,
        })
    }

    /// Ordered constructor arguments, one argv entry each.
    pub fn constructor_args(&self) -> Vec<String> {
        vec![
            self.product_id.clone(),
            self.product_name.clone(),
            self.price.to_string(),
            self.is_available.to_string(),
        ]
    }
}

/// Inclusive range of Solidity `int256`.
pub fn int256_bounds() -> (BigInt, BigInt) {
    let half = BigInt::from(1u8) << 255usize;
    (-half.clone(), half - 1u8)
}

pub fn fits_int256(value: &BigInt) -> bool {
    let (min, max) = int256_bounds();
    *value >= min && *value <= max
}

/// Prices travel as decimal strings; JSON numbers cannot hold int256.
mod decimal {
    use num_bigint::BigInt;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// The fixed-shape product record and its single creation transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDefinition;

impl RecordDefinition {
    pub fn new() -> Self {
        Self
    }

    pub fn contract_name(&self) -> &'static str {
        CONTRACT_NAME
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        &FIELDS
    }

    /// Solidity source with one public variable per field and no setters.
    pub fn render_source(&self) -> String {
        let state_vars = FIELDS
            .iter()
            .map(|f| format!("    {} public {};", f.ty.solidity(), f.name))
            .collect::<Vec<_>>()
            .join("\n");
        let params = FIELDS
            .iter()
            .map(|f| f.ty.param_decl(f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = FIELDS
            .iter()
            .map(|f| format!("        {0} = _{0};", f.name))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "// SPDX-License-Identifier: MIT\n\
             pragma solidity ^0.8.20;\n\
             \n\
             contract {name} {{\n\
             {state_vars}\n\
             \n    constructor({params}) {{\n\
             {assignments}\n    }}\n\
             }}\n",
            name = CONTRACT_NAME,
        )
    }

    /// BLAKE3 of the rendered source.
    pub fn source_fingerprint(&self) -> String {
        blake3::hash(self.render_source().as_bytes()).to_hex().to_string()
    }
}
