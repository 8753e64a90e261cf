//! Keyspace identifiers and the XOR distance metric.

use std::fmt::{self, Debug, Formatter};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The size of keyspace ids in bytes.
pub const ID_SIZE: usize = 20;

/// The size of keyspace ids in bits.
pub const MAX_BUCKET_INDEX: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// A point in the DHT keyspace; either a node id or a lookup target.
pub struct Id(pub [u8; ID_SIZE]);

/// Full XOR distance between two [Id]s.
///
/// Lexicographic ordering over the big-endian XOR bytes; smaller means
/// closer, distance to self is all zeros.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id, InvalidIdSize> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// Map an arbitrary key (a peer identity or a content key) into the
    /// keyspace by hashing it.
    pub fn from_key<T: AsRef<[u8]>>(key: T) -> Id {
        let hash = sha1_smol::Sha1::from(key.as_ref()).digest().bytes();

        Id(hash)
    }

    /// XOR distance to `other`.
    pub fn xor(&self, other: &Id) -> Distance {
        let mut result = [0_u8; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Distance(result)
    }

    /// The routing table bucket this id falls into, as seen from `other`.
    ///
    /// Equals the position of the highest set bit in the XOR result:
    /// 0 for self, [MAX_BUCKET_INDEX] for the furthest Id, 155 for an Id
    /// with 5 leading matching bits.
    pub fn bucket_index(&self, other: &Id) -> u8 {
        for i in 0..ID_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                // leading zeros so far + leading zeros of this byte
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_BUCKET_INDEX - leading_zeros;
            }
        }

        0
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:x?})", &self.0)
    }
}

impl Debug for Distance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({:x?})", &self.0)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Invalid Id size: {0}, expected 20 bytes")]
/// Returned from [Id::from_bytes] for input of the wrong length.
pub struct InvalidIdSize(pub usize);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_bytes() {
        let bytes = [7_u8; ID_SIZE];
        assert_eq!(Id::from_bytes(bytes).unwrap().0, bytes);

        assert!(Id::from_bytes([0_u8; 19]).is_err());
        assert!(Id::from_bytes([0_u8; 21]).is_err());
    }

    #[test]
    fn xor_is_symmetric() {
        let a = Id::random();
        let b = Id::random();

        assert_eq!(a.xor(&b), b.xor(&a));
        assert_eq!(a.xor(&a), Distance([0; ID_SIZE]));
    }

    #[test]
    fn distance_ordering() {
        let target = Id([0; ID_SIZE]);

        let mut near = [0_u8; ID_SIZE];
        near[ID_SIZE - 1] = 1;
        let near = Id(near);

        let mut far = [0_u8; ID_SIZE];
        far[0] = 1;
        let far = Id(far);

        assert!(target.xor(&near) < target.xor(&far));
    }

    #[test]
    fn bucket_index() {
        let zero = Id([0; ID_SIZE]);

        assert_eq!(zero.bucket_index(&zero), 0);
        assert_eq!(zero.bucket_index(&Id([0xff; ID_SIZE])), MAX_BUCKET_INDEX);

        let mut bytes = [0_u8; ID_SIZE];
        bytes[0] = 0b0000_0100;
        // 5 leading matching bits
        assert_eq!(zero.bucket_index(&Id(bytes)), 155);
    }

    #[test]
    fn from_key_is_deterministic() {
        assert_eq!(Id::from_key(b"foo"), Id::from_key(b"foo"));
        assert_ne!(Id::from_key(b"foo"), Id::from_key(b"bar"));
    }
}
