const JHASH_GOLDEN_RATIO: u32 = 0x9e37_79b9;

fn mix(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 13);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 8);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 13);
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 12);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 16);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 5);
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 3);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 10);
    c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 15)
}

/// Bob Jenkins' hash of three words.
pub fn jhash_3words(a: u32, b: u32, c: u32, initval: u32) -> u32 {
    mix(
        a.wrapping_add(JHASH_GOLDEN_RATIO),
        b.wrapping_add(JHASH_GOLDEN_RATIO),
        c.wrapping_add(initval),
    )
}

pub fn jhash_2words(a: u32, b: u32, initval: u32) -> u32 {
    jhash_3words(a, b, 0, initval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(jhash_3words(0, 0, 0, 0), 0xbd49_d10d);
        assert_eq!(jhash_2words(1, 2, 0), 0x6477_d56b);
        assert_eq!(jhash_2words(0x0a00_0001, 2, 0xdead_beef), 0x470b_2e71);
    }

    #[test]
    fn salt_changes_the_hash() {
        assert_ne!(jhash_2words(7, 1, 1), jhash_2words(7, 1, 2));
    }
}
