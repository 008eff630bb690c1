// zkcred/zkcred-circuit/src/registry.rs

use zkcred_common::{
    CircuitId, CredentialError, CredentialMetadata, CredentialResult, CredentialType,
    CURRENT_CIRCUIT_VERSION,
};

use crate::{
    public_data::{
        parse_erc20_balance, parse_erc721_balance, parse_farcaster_fid, parse_native_balance,
    },
    shape::{WitnessShape, FARCASTER_FID_SHAPE, NATIVE_BALANCE_SHAPE, TOKEN_BALANCE_SHAPE},
    witness::{
        build_farcaster_fid_witness, build_native_balance_witness, build_token_balance_witness,
        Witness, WitnessInputs,
    },
};

pub type BuildWitnessFn = fn(&WitnessInputs) -> CredentialResult<Witness>;
pub type ParsePublicDataFn = fn(&[String]) -> CredentialResult<CredentialMetadata>;

/// Everything proving and verification need to know about one credential type.
pub struct CredentialCircuit {
    pub credential_type: CredentialType,
    pub version: &'static str,
    pub shape: &'static WitnessShape,
    pub build_witness: BuildWitnessFn,
    pub parse_public_data: ParsePublicDataFn,
}

impl CredentialCircuit {
    pub fn id(&self) -> CircuitId {
        CircuitId::new(self.credential_type, self.version)
    }

    pub fn build_witness(&self, inputs: &WitnessInputs) -> CredentialResult<Witness> {
        if inputs.circuit != self.id() {
            return Err(CredentialError::InvalidInput(format!(
                "inputs prepared for {} passed to {}",
                inputs.circuit,
                self.id()
            )));
        }
        let witness = (self.build_witness)(inputs)?;
        self.shape.check(&witness)?;
        Ok(witness)
    }

    pub fn parse_public_data(&self, public_inputs: &[String]) -> CredentialResult<CredentialMetadata> {
        (self.parse_public_data)(public_inputs)
    }

    pub fn public_inputs(&self, witness: &Witness) -> CredentialResult<Vec<String>> {
        witness.public_inputs(self.shape)
    }
}

static ERC20_BALANCE: CredentialCircuit = CredentialCircuit {
    credential_type: CredentialType::Erc20Balance,
    version: CURRENT_CIRCUIT_VERSION,
    shape: &TOKEN_BALANCE_SHAPE,
    build_witness: build_token_balance_witness,
    parse_public_data: parse_erc20_balance,
};

static ERC721_BALANCE: CredentialCircuit = CredentialCircuit {
    credential_type: CredentialType::Erc721Balance,
    version: CURRENT_CIRCUIT_VERSION,
    shape: &TOKEN_BALANCE_SHAPE,
    build_witness: build_token_balance_witness,
    parse_public_data: parse_erc721_balance,
};

static NATIVE_BALANCE: CredentialCircuit = CredentialCircuit {
    credential_type: CredentialType::NativeBalance,
    version: CURRENT_CIRCUIT_VERSION,
    shape: &NATIVE_BALANCE_SHAPE,
    build_witness: build_native_balance_witness,
    parse_public_data: parse_native_balance,
};

static FARCASTER_FID: CredentialCircuit = CredentialCircuit {
    credential_type: CredentialType::FarcasterFid,
    version: CURRENT_CIRCUIT_VERSION,
    shape: &FARCASTER_FID_SHAPE,
    build_witness: build_farcaster_fid_witness,
    parse_public_data: parse_farcaster_fid,
};

/// The current circuit for a credential type.
pub fn circuit_for(credential_type: CredentialType) -> &'static CredentialCircuit {
    match credential_type {
        CredentialType::Erc20Balance => &ERC20_BALANCE,
        CredentialType::Erc721Balance => &ERC721_BALANCE,
        CredentialType::NativeBalance => &NATIVE_BALANCE,
        CredentialType::FarcasterFid => &FARCASTER_FID,
    }
}

/// Resolve an exact `(type, version)` pair; unknown versions are refused.
pub fn lookup(id: &CircuitId) -> CredentialResult<&'static CredentialCircuit> {
    let circuit = circuit_for(id.credential_type);
    if circuit.version != id.version {
        return Err(CredentialError::InvalidInput(format!(
            "unsupported circuit {id}, this build ships {}",
            circuit.id()
        )));
    }
    Ok(circuit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_a_current_circuit() {
        for ty in CredentialType::ALL {
            let circuit = circuit_for(ty);
            assert_eq!(circuit.credential_type, ty);
            assert!(lookup(&circuit.id()).is_ok());
        }
    }

    #[test]
    fn unknown_versions_are_refused() {
        let id = CircuitId::new(CredentialType::Erc20Balance, "9.9.9");
        assert!(matches!(lookup(&id), Err(CredentialError::InvalidInput(_))));
    }

    #[test]
    fn parsers_produce_their_own_variant() {
        let mut inputs = vec!["1".to_string(), "1".into(), "1".into(), "0".into(), "0".into()];
        inputs.extend(std::iter::repeat("0".to_string()).take(32));
        for ty in CredentialType::ALL {
            let meta = circuit_for(ty).parse_public_data(&inputs).unwrap();
            assert_eq!(meta.credential_type(), ty);
        }
    }
}
