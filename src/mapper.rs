//! Mapping of inbound parameters onto one source's outgoing query.

use crate::models::{Params, SourceConfig};

/// Build the outgoing query parameters for one source.
///
/// Static parameters are applied first. With a non-empty remapping only the
/// mapped inbound keys are forwarded, under their new names; otherwise every
/// inbound parameter is forwarded unchanged. Forwarded values override static
/// ones with the same key.
pub fn map_request(inbound: &Params, config: &SourceConfig) -> Params {
    let mut outgoing: Params = config
        .querystring
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.to_query_value()))
        .collect();

    match config.request_params.as_ref().filter(|remap| !remap.is_empty()) {
        Some(remap) => {
            for (inbound_key, outgoing_key) in remap {
                if let Some(value) = inbound.get(inbound_key) {
                    outgoing.insert(outgoing_key.clone(), value.clone());
                }
            }
        }
        None => {
            outgoing.extend(inbound.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    outgoing
}
