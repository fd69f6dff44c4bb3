//! FFI bindings for Cradle Fusion
//!
//! This module provides C-compatible functions so band firmware bridges and
//! other languages can call the engine. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `cradle_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::engine::{decide_json, FusionEngine};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Decide one reading against a forest artifact and return the report JSON.
///
/// Loads the model on every call; prefer `cradle_engine_new` for repeated use.
///
/// # Safety
/// - `model_json` and `reading_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `cradle_free_string`.
/// - Returns NULL on error; call `cradle_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn cradle_decide(
    model_json: *const c_char,
    reading_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let model_str = match cstr_to_string(model_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid model string pointer");
            return ptr::null_mut();
        }
    };

    let reading_str = match cstr_to_string(reading_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid reading string pointer");
            return ptr::null_mut();
        }
    };

    match decide_json(model_str, reading_str) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to a FusionEngine
pub struct CradleEngineHandle {
    engine: FusionEngine,
}

/// Load a forest artifact and create an engine.
///
/// # Safety
/// - `model_json` must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `cradle_engine_free`.
/// - Returns NULL if the model cannot be loaded; call `cradle_last_error`.
#[no_mangle]
pub unsafe extern "C" fn cradle_engine_new(model_json: *const c_char) -> *mut CradleEngineHandle {
    clear_last_error();

    let model_str = match cstr_to_string(model_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid model string pointer");
            return ptr::null_mut();
        }
    };

    match FusionEngine::from_model_json(&model_str) {
        Ok(engine) => Box::into_raw(Box::new(CradleEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `cradle_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn cradle_engine_free(engine: *mut CradleEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Decide one reading with a loaded engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `cradle_engine_new`.
/// - `reading_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `cradle_free_string`.
/// - Returns NULL on error; call `cradle_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn cradle_engine_decide(
    engine: *const CradleEngineHandle,
    reading_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    let reading_str = match cstr_to_string(reading_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid reading string pointer");
            return ptr::null_mut();
        }
    };

    match handle.engine.process_json(&reading_str) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Cradle functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Cradle function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn cradle_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Cradle function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn cradle_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn cradle_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
