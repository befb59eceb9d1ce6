/// The djb2 string hash by Dan Bernstein: `h = h * 33 + c`, seeded with 5381.
///
/// Used only to pick a bucket, so quality matters less than being
/// bit-reproducible across runs and platforms.
#[inline]
pub fn hash(name: &[u8]) -> u64 {
    name.iter().fold(5381u64, |h, &c| {
        h.wrapping_shl(5).wrapping_add(h).wrapping_add(u64::from(c))
    })
}
