use crate::error::IdError;

/// Id digit radix. Lexicographic order over the fixed-width form
/// equals numeric order.
pub const RADIX: u64 = 36;

/// Area digits + local digits; every persisted id has this width.
pub const AREA_DIGITS: usize = 6;
pub const LOCAL_DIGITS: usize = 6;
pub const ID_DIGITS: usize = AREA_DIGITS + LOCAL_DIGITS;

/// Ids one area may issue before a fresh area is fetched.
pub const AREA_SIZE: u64 = RADIX.pow(LOCAL_DIGITS as u32);

const MAX_AREA: u64 = RADIX.pow(AREA_DIGITS as u32);

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

///
/// AreaProvider
///
/// Supplies the shared area counter. `next_area` must advance and
/// persist the counter in its own independently committed
/// sub-transaction, so id issuance never blocks nor is blocked by the
/// caller's surrounding transaction. Areas are never reclaimed; gaps
/// in the id sequence are acceptable, duplicates are not.
///

pub trait AreaProvider {
    fn next_area(&mut self) -> Result<u64, IdError>;
}

///
/// IdAllocator
///
/// Issues monotonically increasing fixed-width radix-36 ids, and
/// transient ids for cross-referencing entities within one batch
/// before real ids exist.
///

pub struct IdAllocator<A: AreaProvider> {
    provider: A,
    area: Option<u64>,
    local: u64,
    temp_counter: u64,
}

impl<A: AreaProvider> IdAllocator<A> {
    pub const fn new(provider: A) -> Self {
        Self {
            provider,
            area: None,
            local: 0,
            temp_counter: 0,
        }
    }

    /// Next persisted id. Fetches a fresh area lazily and whenever the
    /// current one is exhausted.
    pub fn next(&mut self) -> Result<String, IdError> {
        let area = match self.area {
            Some(area) if self.local < AREA_SIZE => area,
            _ => {
                let area = self.provider.next_area()?;
                if area >= MAX_AREA {
                    return Err(IdError::AreaExhausted { area });
                }
                self.area = Some(area);
                self.local = 0;
                area
            }
        };

        let id = format!(
            "{}{}",
            fill_digits(&to_radix36(area), AREA_DIGITS),
            fill_digits(&to_radix36(self.local), LOCAL_DIGITS)
        );
        self.local += 1;

        Ok(id)
    }

    /// Transient id, recognizably not persisted.
    pub fn temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("-{}", fill_digits(&to_radix36(self.temp_counter), ID_DIGITS))
    }
}

/// True iff `id` is a real persisted id: fixed width, radix-36 digits,
/// no transient marker.
#[must_use]
pub fn effective(id: &str) -> bool {
    id.len() == ID_DIGITS
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

/// Numeric form of a persisted id; the denormalized redundancy column
/// stores this.
#[must_use]
pub fn numeric(id: &str) -> Option<i64> {
    if !effective(id) {
        return None;
    }
    i64::from_str_radix(id, RADIX as u32).ok()
}

fn to_radix36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % RADIX) as usize]);
        n /= RADIX;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn fill_digits(s: &str, width: usize) -> String {
    format!("{s:0>width$}")
}
