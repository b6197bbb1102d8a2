//! Binary model file.
//!
//! Every value is 8 bytes little-endian, integers as `i64` and parameters as `f64`:
//!
//! ```text
//! input_size
//! transition_count
//! output size of each transition      (transition_count values)
//! activation code of each transition  (transition_count values)
//! weight matrices, row-major, in layer order
//! bias rows, in layer order
//! ```
//!
//! There is no magic number or version field; the file describes itself only
//! through the embedded layer sizes.

use super::{Activation, Network};
use crate::error::{Error, Result};
use bincode::config::{Configuration, Fixint, LittleEndian};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

const MAX_LAYER_WIDTH: i64 = 1 << 20;
const MAX_TRANSITIONS: i64 = 1 << 10;
const MAX_PARAMETERS: usize = 1 << 26;

fn config() -> Configuration<LittleEndian, Fixint> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

pub fn save(net: &Network, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut w = BufWriter::new(File::create(path)?);
    write_to(net, &mut w)?;
    w.flush()?;
    debug!(path = %path.display(), params = net.parameter_count(), "model saved");
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<Network> {
    let mut r = BufReader::new(File::open(path.as_ref())?);
    read_from(&mut r)
}

pub fn write_to<W: Write>(net: &Network, w: &mut W) -> Result<()> {
    put_int(w, net.input_size() as i64)?;
    put_int(w, net.weights().len() as i64)?;
    for m in net.weights() {
        put_int(w, m.ncols() as i64)?;
    }
    for act in net.activations() {
        put_int(w, act.code())?;
    }
    for v in net.serialize_all_parameters() {
        bincode::encode_into_std_write(v, w, config())?;
    }
    Ok(())
}

pub fn read_from<R: Read>(r: &mut R) -> Result<Network> {
    let input = get_int(r)?;
    let transitions = get_int(r)?;
    if !(2..=MAX_TRANSITIONS).contains(&transitions) {
        return Err(Error::CorruptModel(format!(
            "transition count {transitions} out of range"
        )));
    }

    let mut layers = vec![layer_width(input)?];
    for _ in 0..transitions {
        layers.push(layer_width(get_int(r)?)?);
    }
    let mut activations = Vec::with_capacity(transitions as usize);
    for _ in 0..transitions {
        activations.push(Activation::from_code(get_int(r)?)?);
    }

    let count = parameter_count(&layers)?;
    // capacity follows the values actually read, not the header
    let mut params = Vec::new();
    for _ in 0..count {
        let v: f64 = bincode::decode_from_std_read(r, config())?;
        params.push(v);
    }
    Network::from_parameters(&layers, &activations, &params)
}

fn parameter_count(layers: &[usize]) -> Result<usize> {
    let mut total: usize = 0;
    for pair in layers.windows(2) {
        total = pair[0]
            .checked_mul(pair[1])
            .and_then(|w| w.checked_add(pair[1]))
            .and_then(|n| total.checked_add(n))
            .filter(|&n| n <= MAX_PARAMETERS)
            .ok_or_else(|| {
                Error::CorruptModel(format!("topology {layers:?} exceeds {MAX_PARAMETERS} parameters"))
            })?;
    }
    Ok(total)
}

fn put_int<W: Write>(w: &mut W, v: i64) -> Result<()> {
    bincode::encode_into_std_write(v, w, config())?;
    Ok(())
}

fn get_int<R: Read>(r: &mut R) -> Result<i64> {
    Ok(bincode::decode_from_std_read(r, config())?)
}

fn layer_width(v: i64) -> Result<usize> {
    if (1..=MAX_LAYER_WIDTH).contains(&v) {
        Ok(v as usize)
    } else {
        Err(Error::CorruptModel(format!("layer size {v} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::io::Cursor;

    fn sample() -> Network {
        let mut rng = SmallRng::seed_from_u64(3);
        Network::with_activations(
            &[4, 3, 2],
            &[Activation::LeakyRelu, Activation::Softmax],
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn test_byte_layout() {
        let net = sample();
        let mut buf = Vec::new();
        write_to(&net, &mut buf).unwrap();

        let params = net.parameter_count();
        assert_eq!(buf.len(), 8 * (2 + 2 + 2 + params));

        let int_at = |i: usize| i64::from_le_bytes(buf[i * 8..i * 8 + 8].try_into().unwrap());
        assert_eq!(int_at(0), 4);
        assert_eq!(int_at(1), 2);
        assert_eq!(int_at(2), 3);
        assert_eq!(int_at(3), 2);
        assert_eq!(int_at(4), Activation::LeakyRelu.code());
        assert_eq!(int_at(5), Activation::Softmax.code());

        let first = f64::from_le_bytes(buf[48..56].try_into().unwrap());
        assert_eq!(first, net.serialize_all_parameters()[0]);
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let net = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        net.save(&path).unwrap();
        let loaded = Network::load(&path).unwrap();

        assert_eq!(loaded.layer_sizes(), net.layer_sizes());
        assert_eq!(loaded.activations(), net.activations());
        let a: Vec<u64> = net.serialize_all_parameters().iter().map(|v| v.to_bits()).collect();
        let b: Vec<u64> = loaded.serialize_all_parameters().iter().map(|v| v.to_bits()).collect();
        assert_eq!(a, b);

        let x = [0.3, -0.7, 1.5, 0.0];
        assert_eq!(net.forward(&x).unwrap(), loaded.forward(&x).unwrap());
    }

    #[test]
    fn test_truncated_file_fails() {
        let mut buf = Vec::new();
        write_to(&sample(), &mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        assert!(read_from(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn test_bad_header_fails() {
        let mut buf = Vec::new();
        for v in [4i64, 2, 3, 2, 99, 1] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            read_from(&mut Cursor::new(buf)),
            Err(Error::UnknownActivation(99))
        ));

        let mut buf = Vec::new();
        for v in [4i64, -1] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            read_from(&mut Cursor::new(buf)),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn test_oversized_header_fails() {
        let mut buf = Vec::new();
        for v in [1i64 << 20, 2, 1 << 20, 1 << 20, 0, 0] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            read_from(&mut Cursor::new(buf)),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn test_header_without_payload_fails() {
        let mut buf = Vec::new();
        for v in [1000i64, 2, 1000, 4, 0, 0] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            read_from(&mut Cursor::new(buf)),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Network::load(dir.path().join("nope.bin")),
            Err(Error::Io(_))
        ));
    }
}
