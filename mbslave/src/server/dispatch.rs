use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::constants::limits::MAX_PDU_DATA_LENGTH;
use crate::error::ConfigError;
use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::handler::FunctionHandler;
use crate::server::store::RegisterStore;
use crate::server::table::{BoxedHandler, DispatchTable};
use crate::types::UnitId;

/// Register store and dispatch table for a set of devices
///
/// The set of unit ids is fixed at construction. Every device starts out with the standard
/// handlers for function codes 1, 2, 3, 4, 5, 6, 15 and 16 installed.
///
/// A `ServerState` can be used synchronously, e.g. in tests, or handed to
/// [`Server::spawn`](crate::server::Server::spawn) which moves it onto the dispatch task.
pub struct ServerState {
    store: RegisterStore,
    table: DispatchTable,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("unit_ids", &self.table.unit_ids().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Create the tables and the default bindings for each unit id
    pub fn new(unit_ids: &[UnitId]) -> Self {
        Self {
            store: RegisterStore::new(unit_ids),
            table: DispatchTable::new(unit_ids),
        }
    }

    /// Bind a handler to a function code of a device, replacing any previous binding
    ///
    /// Fails with [`ConfigError::UnknownUnitId`] if the unit id was not part of the
    /// initial configuration, in which case nothing changes.
    pub fn register_handler<H>(
        &mut self,
        unit_id: UnitId,
        function: u8,
        handler: H,
    ) -> Result<(), ConfigError>
    where
        H: FunctionHandler,
    {
        self.register_boxed(unit_id, function, Box::new(handler))
    }

    pub(crate) fn register_boxed(
        &mut self,
        unit_id: UnitId,
        function: u8,
        handler: BoxedHandler,
    ) -> Result<(), ConfigError> {
        self.table.register(unit_id, function, handler)
    }

    /// Register values of all devices
    pub fn store(&self) -> &RegisterStore {
        &self.store
    }

    /// Mutable register values of all devices
    pub fn store_mut(&mut self) -> &mut RegisterStore {
        &mut self.store
    }

    /// Compute the response to a request
    ///
    /// The response is a copy of the request's header with either the handler's data or an
    /// exception. The payload of the request is only ever interpreted by the handler.
    pub fn dispatch(&mut self, request: &dyn Frame) -> Box<dyn Frame> {
        let mut response = request.copy();
        match self.invoke(request) {
            Ok(data) => response.set_data(&data),
            Err(ex) => response.set_exception(ex),
        }
        response
    }

    fn invoke(&mut self, request: &dyn Frame) -> Result<Vec<u8>, ExceptionCode> {
        let unit_id = request.unit_id();
        let function = request.function();

        let functions = match self.table.get_mut(unit_id) {
            Some(x) => x,
            None => {
                tracing::warn!("request for unknown unit id: {}", unit_id);
                return Err(ExceptionCode::ServerDeviceFailure);
            }
        };

        let handler = match functions.get_mut(function) {
            Some(x) => x,
            None => {
                tracing::warn!(
                    "no handler for function code {:#04X} on unit id: {}",
                    function,
                    unit_id
                );
                return Err(ExceptionCode::IllegalFunction);
            }
        };

        let store = &mut self.store;
        let data = match catch_unwind(AssertUnwindSafe(|| handler.handle(store, request))) {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(
                    "handler for function code {:#04X} on unit id {} panicked",
                    function,
                    unit_id
                );
                return Err(ExceptionCode::ServerDeviceFailure);
            }
        };

        if data.len() > MAX_PDU_DATA_LENGTH {
            tracing::error!(
                "handler for function code {:#04X} returned {} bytes (max {})",
                function,
                data.len(),
                MAX_PDU_DATA_LENGTH
            );
            return Err(ExceptionCode::ServerDeviceFailure);
        }

        Ok(data)
    }
}
