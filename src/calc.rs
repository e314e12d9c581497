use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shown in place of the number while the game is in its exploded state.
pub(crate) const EXPLODED_SENTINEL: &str = "BOOM! 💥";

// 8 fractional digits
const ROUND_SCALE: f64 = 100_000_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub(crate) fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '-',
            Operator::Multiply => '×',
            Operator::Divide => '÷',
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Operator::Add => a + b,
            Operator::Subtract => a - b,
            Operator::Multiply => a * b,
            Operator::Divide => a / b,
        }
    }
}

/// One keypad token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Key {
    Digit(u8),
    Point,
    Op(Operator),
    Clear,
    Backspace,
    Equals,
}

impl Key {
    /// Maps a keypad glyph (or its plain-ASCII stand-in) to a token.
    pub(crate) fn from_char(ch: char) -> Option<Key> {
        match ch {
            '0'..='9' => Some(Key::Digit(ch as u8 - b'0')),
            '.' => Some(Key::Point),
            '+' => Some(Key::Op(Operator::Add)),
            '-' => Some(Key::Op(Operator::Subtract)),
            '×' | '*' | 'x' | 'X' => Some(Key::Op(Operator::Multiply)),
            '÷' | '/' => Some(Key::Op(Operator::Divide)),
            'C' | 'c' => Some(Key::Clear),
            '▶' => Some(Key::Backspace),
            '=' => Some(Key::Equals),
            _ => None,
        }
    }
}

/// What `=` does when an operand is not a usable number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum InvalidOperandPolicy {
    /// The result silently becomes 0.
    #[default]
    Zero,
    /// The press is rejected with a [`CalcError`] and the state is left as it was.
    PropagateError,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub(crate) enum CalcError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("not a number: {0:?}")]
    InvalidOperand(String),
    #[error("result out of range")]
    NonFinite,
}

/// Single-operator calculator. No precedence: `=` applies the one pending
/// operator to the stored first operand and the current display value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Calculator {
    pub(crate) display_value: String,
    pub(crate) pending_operator: Option<Operator>,
    pub(crate) first_operand: String,
    pub(crate) awaiting_second_operand: bool,
    pub(crate) last_history: Option<String>,
    pub(crate) policy: InvalidOperandPolicy,
}

impl Calculator {
    pub(crate) fn new(policy: InvalidOperandPolicy) -> Self {
        Self {
            display_value: "0".to_string(),
            pending_operator: None,
            first_operand: String::new(),
            awaiting_second_operand: false,
            last_history: None,
            policy,
        }
    }

    pub(crate) fn is_exploded(&self) -> bool {
        self.display_value == EXPLODED_SENTINEL
    }

    /// Returns the state after `key`. Only fails under
    /// [`InvalidOperandPolicy::PropagateError`].
    pub(crate) fn reduce(&self, key: Key) -> Result<Self, CalcError> {
        let mut next = self.clone();
        match key {
            Key::Clear => next.clear(),
            Key::Backspace => next.backspace(),
            Key::Equals => next.equals()?,
            Key::Op(op) => {
                next.first_operand = if next.is_exploded() {
                    "0".to_string()
                } else {
                    next.display_value.clone()
                };
                next.pending_operator = Some(op);
                next.awaiting_second_operand = true;
            }
            Key::Digit(_) | Key::Point => next.enter(key),
        }
        Ok(next)
    }

    /// Back to the zero state. `last_history` survives.
    pub(crate) fn clear(&mut self) {
        self.display_value = "0".to_string();
        self.pending_operator = None;
        self.first_operand.clear();
        self.awaiting_second_operand = false;
    }

    /// Snapshots the current expression into `last_history` and shows the sentinel.
    pub(crate) fn explode(&mut self) {
        self.last_history = Some(self.display_text());
        self.display_value = EXPLODED_SENTINEL.to_string();
    }

    pub(crate) fn display_text(&self) -> String {
        if self.is_exploded() {
            return self.display_value.clone();
        }
        match self.pending_operator {
            Some(op) if !self.first_operand.is_empty() => {
                if self.awaiting_second_operand {
                    format!("{} {}", self.first_operand, op.symbol())
                } else {
                    format!("{} {} {}", self.first_operand, op.symbol(), self.display_value)
                }
            }
            _ => self.display_value.clone(),
        }
    }

    fn backspace(&mut self) {
        if self.awaiting_second_operand && self.pending_operator.is_some() {
            self.pending_operator = None;
            self.awaiting_second_operand = false;
        } else if self.is_exploded() {
            self.display_value = "0".to_string();
        } else if !self.awaiting_second_operand && self.display_value != "0" {
            self.display_value.pop();
            if self.display_value.is_empty() {
                self.display_value.push('0');
            }
        }
    }

    fn equals(&mut self) -> Result<(), CalcError> {
        let Some(op) = self.pending_operator else {
            return Ok(());
        };
        if self.first_operand.is_empty() {
            return Ok(());
        }
        let result = match compute(&self.first_operand, op, &self.display_value) {
            Ok(v) => v,
            Err(err) => match self.policy {
                InvalidOperandPolicy::Zero => 0.0,
                InvalidOperandPolicy::PropagateError => return Err(err),
            },
        };
        self.display_value = format_number(result);
        self.pending_operator = None;
        self.first_operand.clear();
        self.awaiting_second_operand = true;
        Ok(())
    }

    fn enter(&mut self, key: Key) {
        let fresh = match key {
            Key::Point => "0.".to_string(),
            Key::Digit(d) => digit_char(d).to_string(),
            _ => return,
        };
        if self.awaiting_second_operand {
            self.display_value = fresh;
            self.awaiting_second_operand = false;
            return;
        }
        if self.is_exploded() {
            self.display_value = fresh;
            return;
        }
        match key {
            Key::Point => {
                if !self.display_value.contains('.') {
                    self.display_value.push('.');
                }
            }
            Key::Digit(d) => {
                if self.display_value == "0" {
                    self.display_value = fresh;
                } else {
                    self.display_value.push(digit_char(d));
                }
            }
            _ => {}
        }
    }
}

fn digit_char(d: u8) -> char {
    char::from(b'0' + d.min(9))
}

fn parse_operand(s: &str) -> Result<f64, CalcError> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CalcError::InvalidOperand(s.to_string()))
}

/// Applies `op` and rounds to 8 fractional digits.
pub(crate) fn compute(first: &str, op: Operator, second: &str) -> Result<f64, CalcError> {
    let a = parse_operand(first)?;
    let b = parse_operand(second)?;
    if op == Operator::Divide && b == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    let raw = op.apply(a, b);
    if !raw.is_finite() {
        return Err(CalcError::NonFinite);
    }
    let scaled = raw * ROUND_SCALE;
    if scaled.is_finite() {
        Ok(scaled.round() / ROUND_SCALE)
    } else {
        Ok(raw)
    }
}

fn format_number(v: f64) -> String {
    if v == 0.0 {
        // also folds -0
        return "0".to_string();
    }
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press_all(calc: &Calculator, keys: &str) -> Calculator {
        keys.chars().fold(calc.clone(), |acc, ch| {
            let key = Key::from_char(ch).expect("keypad glyph");
            acc.reduce(key).expect("zero policy never fails")
        })
    }

    fn fresh() -> Calculator {
        Calculator::new(InvalidOperandPolicy::Zero)
    }

    #[test]
    fn digits_concatenate_with_leading_zero_collapsed() {
        assert_eq!(press_all(&fresh(), "0012").display_value, "12");
        assert_eq!(press_all(&fresh(), "3.14").display_value, "3.14");
        assert_eq!(press_all(&fresh(), ".5").display_value, "0.5");
        assert_eq!(press_all(&fresh(), "907").display_value, "907");
    }

    #[test]
    fn second_point_is_rejected() {
        assert_eq!(press_all(&fresh(), "1.2.3").display_value, "1.23");
    }

    #[test]
    fn clear_is_idempotent() {
        let typed = press_all(&fresh(), "12+4");
        let once = typed.reduce(Key::Clear).unwrap();
        let twice = once.reduce(Key::Clear).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.display_value, "0");
        assert_eq!(once.pending_operator, None);
        assert!(once.first_operand.is_empty());
        assert!(!once.awaiting_second_operand);
    }

    #[test]
    fn five_plus_three_is_eight() {
        let c = press_all(&fresh(), "5+3=");
        assert_eq!(c.display_value, "8");
        assert_eq!(c.pending_operator, None);
        assert!(c.first_operand.is_empty());
        assert!(c.awaiting_second_operand);
    }

    #[test]
    fn divide_by_zero_falls_back_to_zero() {
        assert_eq!(press_all(&fresh(), "6÷0=").display_value, "0");
    }

    #[test]
    fn divide_by_zero_propagates_when_asked() {
        let calc = Calculator::new(InvalidOperandPolicy::PropagateError);
        let pending = ["6", "÷", "0"].iter().fold(calc, |acc, s| {
            let key = Key::from_char(s.chars().next().unwrap()).unwrap();
            acc.reduce(key).unwrap()
        });
        assert_eq!(pending.reduce(Key::Equals), Err(CalcError::DivisionByZero));
    }

    #[test]
    fn results_are_rounded_to_eight_places() {
        assert_eq!(press_all(&fresh(), ".1+.2=").display_value, "0.3");
        assert_eq!(press_all(&fresh(), "1÷3=").display_value, "0.33333333");
        assert_eq!(press_all(&fresh(), "2-5=").display_value, "-3");
        assert_eq!(press_all(&fresh(), "2.5×4=").display_value, "10");
    }

    #[test]
    fn digit_after_equals_starts_a_new_number() {
        let c = press_all(&fresh(), "5+3=7");
        assert_eq!(c.display_value, "7");
        assert!(!c.awaiting_second_operand);
    }

    #[test]
    fn point_while_awaiting_starts_with_zero() {
        let c = press_all(&fresh(), "4×.");
        assert_eq!(c.display_value, "0.");
        assert_eq!(c.display_text(), "4 × 0.");
    }

    #[test]
    fn backspace_drops_last_char_then_falls_back_to_zero() {
        let c = press_all(&fresh(), "42▶");
        assert_eq!(c.display_value, "4");
        let c = press_all(&c, "▶▶");
        assert_eq!(c.display_value, "0");
    }

    #[test]
    fn backspace_cancels_pending_operator() {
        let c = press_all(&fresh(), "9-▶");
        assert_eq!(c.pending_operator, None);
        assert!(!c.awaiting_second_operand);
        assert_eq!(c.display_text(), "9");
    }

    #[test]
    fn backspace_after_equals_is_ignored() {
        let c = press_all(&fresh(), "5+3=▶");
        assert_eq!(c.display_value, "8");
    }

    #[test]
    fn operator_replaces_pending_one() {
        let c = press_all(&fresh(), "5+×");
        assert_eq!(c.pending_operator, Some(Operator::Multiply));
        assert_eq!(c.first_operand, "5");
    }

    #[test]
    fn display_text_follows_operator_state() {
        let c = press_all(&fresh(), "12+");
        assert_eq!(c.display_text(), "12 +");
        let c = press_all(&c, "30");
        assert_eq!(c.display_text(), "12 + 30");
    }

    #[test]
    fn explode_snapshots_expression_and_shows_sentinel() {
        let mut c = press_all(&fresh(), "7÷2");
        c.explode();
        assert_eq!(c.last_history.as_deref(), Some("7 ÷ 2"));
        assert_eq!(c.display_text(), EXPLODED_SENTINEL);
        assert!(c.is_exploded());
    }

    #[test]
    fn digit_overwrites_sentinel() {
        let mut c = fresh();
        c.explode();
        assert_eq!(press_all(&c, "3").display_value, "3");
        assert_eq!(press_all(&c, ".").display_value, "0.");
    }

    #[test]
    fn clear_keeps_history() {
        let mut c = press_all(&fresh(), "8");
        c.explode();
        c.clear();
        assert_eq!(c.display_value, "0");
        assert_eq!(c.last_history.as_deref(), Some("8"));
    }

    #[test]
    fn unparseable_operand_is_an_error() {
        assert_eq!(
            compute("-", Operator::Add, "1"),
            Err(CalcError::InvalidOperand("-".to_string()))
        );
        assert_eq!(compute("5.", Operator::Add, "1"), Ok(6.0));
    }

    #[test]
    fn overflow_is_non_finite() {
        let big = format!("{}", f64::MAX);
        assert_eq!(compute(&big, Operator::Multiply, "10"), Err(CalcError::NonFinite));
    }
}
