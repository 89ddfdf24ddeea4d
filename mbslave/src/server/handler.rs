use crate::exception::ExceptionCode;
use crate::frame::Frame;
use crate::server::store::RegisterStore;

/// Handles one function code for one device
///
/// A handler receives the whole register store and the request frame, and returns either the
/// response data that follows the function code or an exception. It is called on the dispatch
/// task only, one request at a time, so it may freely mutate the store.
///
/// Functions and closures with a matching signature implement this trait:
///
/// ```
/// use mbslave::*;
/// use mbslave::server::*;
///
/// fn echo(_store: &mut RegisterStore, request: &dyn Frame) -> Result<Vec<u8>, ExceptionCode> {
///     Ok(request.data().to_vec())
/// }
///
/// let mut state = ServerState::new(&[UnitId::new(1)]);
/// state.register_handler(UnitId::new(1), 0x41, echo).unwrap();
/// ```
pub trait FunctionHandler: Send + 'static {
    /// Produce the response data for a request, or an exception
    fn handle(
        &mut self,
        store: &mut RegisterStore,
        request: &dyn Frame,
    ) -> Result<Vec<u8>, ExceptionCode>;
}

impl<F> FunctionHandler for F
where
    F: FnMut(&mut RegisterStore, &dyn Frame) -> Result<Vec<u8>, ExceptionCode> + Send + 'static,
{
    fn handle(
        &mut self,
        store: &mut RegisterStore,
        request: &dyn Frame,
    ) -> Result<Vec<u8>, ExceptionCode> {
        self(store, request)
    }
}

/// Pins down the signature of a closure so it can be registered as a [`FunctionHandler`]
///
/// ```
/// use mbslave::*;
/// use mbslave::server::*;
///
/// let mut count: u16 = 0;
/// let counter = handler_fn(move |_store, _request| {
///     count = count.wrapping_add(1);
///     Ok(count.to_be_bytes().to_vec())
/// });
///
/// let mut state = ServerState::new(&[UnitId::new(1)]);
/// state.register_handler(UnitId::new(1), 0x42, counter).unwrap();
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: FnMut(&mut RegisterStore, &dyn Frame) -> Result<Vec<u8>, ExceptionCode> + Send + 'static,
{
    f
}
