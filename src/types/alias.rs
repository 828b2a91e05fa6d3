use super::TypeDef;

/// A `define X as Y` alias. `reference_size`/`size_bytes` delegate to the
/// base type; `resolve_base_type` follows the chain.
#[derive(Debug)]
pub struct AliasTypeDef {
  pub name: String,
  pub base_type: TypeDef,
}
