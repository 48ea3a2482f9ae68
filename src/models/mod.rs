pub mod device;
pub mod rule;
pub mod window;

pub use device::{DesiredRule, DeviceError, MacAddress, RemoteActiveRule};
pub use rule::{AppProto, Rule, RuleAction, RuleError, TimeOfDay, TimeRange, Weekday, WeekdaySet};
pub use window::{AtomicSlice, BlockWindow, DayWindow, DominantRecord, Schedule};
