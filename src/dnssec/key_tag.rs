/// Key tag of a DNSKEY given as its parts (RFC 4034 Appendix B)
pub fn calculate_key_tag(flags: u16, protocol: u8, algorithm: u8, public_key: &[u8]) -> u16 {
    // RSAMD5 keys use the low 16 bits of the modulus
    if algorithm == 1 {
        return match public_key {
            [.., hi, lo] => u16::from_be_bytes([*hi, *lo]),
            _ => 0,
        };
    }

    let [f0, f1] = flags.to_be_bytes();
    let header = [f0, f1, protocol, algorithm];
    // The header is four octets, so key octets keep their even/odd position
    let sum = checksum(&header) + checksum(public_key);
    fold(sum)
}

/// Key tag computed over complete DNSKEY rdata
pub fn key_tag_from_rdata(rdata: &[u8]) -> Option<u16> {
    match rdata {
        [f0, f1, protocol, algorithm, key @ ..] => Some(calculate_key_tag(
            u16::from_be_bytes([*f0, *f1]),
            *protocol,
            *algorithm,
            key,
        )),
        _ => None,
    }
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (u32::from(*hi) << 8) + u32::from(*lo),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum()
}

fn fold(mut acc: u32) -> u16 {
    acc += (acc >> 16) & 0xFFFF;
    (acc & 0xFFFF) as u16
}
