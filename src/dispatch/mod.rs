pub mod actuator;
pub mod dispatcher;
pub mod reporter;

pub use actuator::{
    Actuator, ActuatorCommand, DispatchError, RelayBankHandle, RelayBankSnapshot, SimulatedRelayBank,
};
pub use dispatcher::ActionDispatcher;
pub use reporter::{
    FsmAtomicReport, FsmFullReport, LogReportSink, ReportError, ReportSink, Reporter, ReporterHandle,
};
