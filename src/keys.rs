//! Newtype wrappers standing in for the BLS12-381 key material embedded in a real
//! plot file. The crate never verifies or manipulates signatures; it only compares
//! and persists key bytes, so a fixed-size opaque array is sufficient.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! key_newtype {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in &self.0[..4] {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "..)")
            }
        }
    };
}

key_newtype!(FarmerPublicKey, 48);
key_newtype!(PoolPublicKey, 48);
key_newtype!(PlotPublicKey, 48);
key_newtype!(PoolContractPuzzleHash, 32);
