//! X11 delivery through XTest or `XSendEvent`, acknowledged by property-change round trips.

use super::{DeliveryBackend, ObserverHandle};
use crate::ack::{AckRegistry, AckToken};
use crate::error::{InputError, SubmitError};
use crate::hover::{PointerRecord, PointerSink};
use crate::keymap;
use crate::layout::{KeyboardLayout, UsLayout};
use crate::types::{
    ButtonMask, EventClass, Modifiers, NativeEvent, NativeInput, Point, PointerButton,
    TargetHandle,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::ffi::CString;
use std::os::raw::{c_int, c_long, c_uint, c_ulong};
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace};
use x11::xlib::*;
use x11::xtest::*;

const ACK_PROPERTY: &str = "_SYNPUT_ACK";

/// Last X error code seen by [`record_error`]; 0 when none.
static LAST_ERROR: AtomicU8 = AtomicU8::new(0);

unsafe extern "C" fn record_error(_display: *mut Display, event: *mut XErrorEvent) -> c_int {
    LAST_ERROR.store((*event).error_code, Ordering::SeqCst);
    0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Fake device events; indistinguishable from hardware.
    XTest,
    /// Synthetic events sent to the target window.
    SendEvent,
}

struct Connection(*mut Display);

// Display pointer is only touched behind a Mutex.
unsafe impl Send for Connection {}

impl Connection {
    fn open() -> Result<Self, InputError> {
        let display = unsafe { XOpenDisplay(ptr::null()) };
        if display.is_null() {
            error!("Failed to open X11 display");
            return Err(InputError::Backend("cannot open X11 display".into()));
        }
        Ok(Self(display))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        unsafe {
            XCloseDisplay(self.0);
        }
    }
}

struct PropertyObserver {
    target: TargetHandle,
    sink: AckRegistry,
    queue: VecDeque<AckToken>,
    last_time: Time,
}

pub struct X11Backend {
    conn: Connection,
    mode: DeliveryMode,
    root: Window,
    ack_atom: Atom,
    observers: HashMap<u64, PropertyObserver>,
    next_observer: u64,
}

impl X11Backend {
    pub fn open(mode: DeliveryMode) -> Result<Self, InputError> {
        let conn = Connection::open()?;
        let display = conn.0;
        let name = CString::new(ACK_PROPERTY)
            .map_err(|e| InputError::Backend(e.to_string()))?;
        let (root, ack_atom) = unsafe {
            XSetErrorHandler(Some(record_error));
            if mode == DeliveryMode::XTest {
                let (mut ev, mut err, mut major, mut minor) = (0, 0, 0, 0);
                if XTestQueryExtension(display, &mut ev, &mut err, &mut major, &mut minor) == 0 {
                    return Err(InputError::Backend("XTest extension missing".into()));
                }
            }
            (
                XDefaultRootWindow(display),
                XInternAtom(display, name.as_ptr(), False),
            )
        };
        info!("X11 backend in {:?} mode", mode);
        Ok(Self {
            conn,
            mode,
            root,
            ack_atom,
            observers: HashMap::new(),
            next_observer: 1,
        })
    }

    fn display(&self) -> *mut Display {
        self.conn.0
    }

    /// Flushes and surfaces any protocol error raised by the requests just sent.
    fn sync(&self, target: TargetHandle) -> Result<(), SubmitError> {
        LAST_ERROR.store(0, Ordering::SeqCst);
        unsafe {
            XSync(self.display(), False);
        }
        match LAST_ERROR.swap(0, Ordering::SeqCst) {
            0 => Ok(()),
            BadWindow => Err(SubmitError::TargetGone(target.raw())),
            code => Err(SubmitError::Platform(format!("X error {}", code))),
        }
    }

    fn keycode(&self, input: NativeInput) -> Result<c_uint, SubmitError> {
        let sym = match input {
            NativeInput::Key(key) => keymap::x11_keysym(key)
                .ok_or(SubmitError::Unsupported("key has no X11 keysym"))?,
            NativeInput::Unicode(c) => keymap::unicode_keysym(c),
            _ => return Err(SubmitError::Unsupported("not a key event")),
        };
        let code = unsafe { XKeysymToKeycode(self.display(), c_ulong::from(sym)) };
        if code == 0 {
            return Err(SubmitError::Unsupported("keysym is not on the keyboard map"));
        }
        Ok(c_uint::from(code))
    }

    /// Window coordinates to root coordinates.
    fn to_root(&self, target: TargetHandle, at: Point) -> Result<Point, SubmitError> {
        let (mut x, mut y, mut child) = (0, 0, 0);
        let ok = unsafe {
            XTranslateCoordinates(
                self.display(),
                target.raw() as Window,
                self.root,
                at.x,
                at.y,
                &mut x,
                &mut y,
                &mut child,
            )
        };
        if ok == 0 {
            return Err(SubmitError::TargetGone(target.raw()));
        }
        Ok(Point::new(x, y))
    }

    fn fake(&self, event: &NativeEvent) -> Result<(), SubmitError> {
        let display = self.display();
        let press = c_int::from(matches!(
            event.class,
            EventClass::KeyDown | EventClass::PointerDown
        ));
        match event.class {
            EventClass::KeyDown | EventClass::KeyUp => {
                let code = self.keycode(event.input)?;
                unsafe {
                    XTestFakeKeyEvent(display, code, press, CurrentTime);
                }
            }
            // The server derives double clicks from timing.
            EventClass::PointerDoubleClick => return Ok(()),
            EventClass::PointerMove | EventClass::PointerDown | EventClass::PointerUp => {
                let at = self.to_root(event.target, event.position.unwrap_or_default())?;
                unsafe {
                    XTestFakeMotionEvent(display, -1, at.x, at.y, CurrentTime);
                    if let NativeInput::Button(b) = event.input {
                        XTestFakeButtonEvent(display, button_number(b), press, CurrentTime);
                    }
                }
            }
        }
        unsafe {
            XFlush(display);
        }
        Ok(())
    }

    fn send(&self, event: &NativeEvent) -> Result<(), SubmitError> {
        let display = self.display();
        let window = event.target.raw() as Window;
        let at = event.position.unwrap_or_default();
        let root_at = if event.position.is_some() {
            self.to_root(event.target, at)?
        } else {
            Point::default()
        };
        let state = state_mask(event.modifiers, event.buttons);

        let (mut xevent, mask) = match event.class {
            EventClass::KeyDown | EventClass::KeyUp => {
                let down = event.class == EventClass::KeyDown;
                let key = XKeyEvent {
                    type_: if down { KeyPress } else { KeyRelease },
                    serial: 0,
                    send_event: True,
                    display,
                    window,
                    root: self.root,
                    subwindow: 0,
                    time: CurrentTime,
                    x: at.x,
                    y: at.y,
                    x_root: root_at.x,
                    y_root: root_at.y,
                    state,
                    keycode: self.keycode(event.input)?,
                    same_screen: True,
                };
                let mask = if down { KeyPressMask } else { KeyReleaseMask };
                (XEvent { key }, mask)
            }
            EventClass::PointerDoubleClick => return Ok(()),
            EventClass::PointerDown | EventClass::PointerUp => {
                let NativeInput::Button(b) = event.input else {
                    return Err(SubmitError::Unsupported("pointer event without a button"));
                };
                let down = event.class == EventClass::PointerDown;
                let button = XButtonEvent {
                    type_: if down { ButtonPress } else { ButtonRelease },
                    serial: 0,
                    send_event: True,
                    display,
                    window,
                    root: self.root,
                    subwindow: 0,
                    time: CurrentTime,
                    x: at.x,
                    y: at.y,
                    x_root: root_at.x,
                    y_root: root_at.y,
                    state,
                    button: button_number(b),
                    same_screen: True,
                };
                let mask = if down { ButtonPressMask } else { ButtonReleaseMask };
                (XEvent { button }, mask)
            }
            EventClass::PointerMove => {
                let motion = XMotionEvent {
                    type_: MotionNotify,
                    serial: 0,
                    send_event: True,
                    display,
                    window,
                    root: self.root,
                    subwindow: 0,
                    time: CurrentTime,
                    x: at.x,
                    y: at.y,
                    x_root: root_at.x,
                    y_root: root_at.y,
                    state,
                    is_hint: 0,
                    same_screen: True,
                };
                (XEvent { motion }, PointerMotionMask)
            }
        };

        let status = unsafe { XSendEvent(display, window, True, mask, &mut xevent) };
        if status == 0 {
            return Err(SubmitError::QueueRejected);
        }
        unsafe {
            XFlush(display);
        }
        Ok(())
    }

    fn observe(&mut self, property: &XPropertyEvent) {
        if property.atom != self.ack_atom {
            return;
        }
        let target = property.window as u64;
        let Some(obs) = self
            .observers
            .values_mut()
            .find(|o| o.target.raw() == target)
        else {
            return;
        };
        // Property changes on one window are reported in order; anything older
        // than the last marker seen belongs to an earlier round.
        if property.time < obs.last_time {
            trace!("Stale marker notify on {:#x}", target);
            return;
        }
        obs.last_time = property.time;
        if let Some(token) = obs.queue.pop_front() {
            obs.sink.acknowledge(token);
        }
    }
}

impl DeliveryBackend for X11Backend {
    fn name(&self) -> &'static str {
        match self.mode {
            DeliveryMode::XTest => "xtest",
            DeliveryMode::SendEvent => "x-send-event",
        }
    }

    fn validate_target(&self, target: TargetHandle) -> Result<(), InputError> {
        let mut attrs: XWindowAttributes = unsafe { std::mem::zeroed() };
        LAST_ERROR.store(0, Ordering::SeqCst);
        let ok = unsafe {
            XGetWindowAttributes(self.display(), target.raw() as Window, &mut attrs)
        };
        LAST_ERROR.store(0, Ordering::SeqCst);
        if ok == 0 {
            return Err(InputError::InvalidTarget(target.raw()));
        }
        Ok(())
    }

    fn layout(&self) -> Arc<dyn KeyboardLayout> {
        Arc::new(UsLayout)
    }

    fn submit(&mut self, event: &NativeEvent) -> Result<(), SubmitError> {
        trace!("{:?} {:?} -> {}", event.class, event.input, event.target);
        match self.mode {
            DeliveryMode::XTest => self.fake(event)?,
            DeliveryMode::SendEvent => self.send(event)?,
        }
        if event.needs_ack {
            return Ok(());
        }
        // Unacknowledged events still surface a vanished window promptly.
        self.sync(event.target)
    }

    fn install_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError> {
        unsafe {
            XSelectInput(self.display(), target.raw() as Window, PropertyChangeMask);
        }
        self.sync(target)?;
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.insert(
            id,
            PropertyObserver {
                target,
                sink,
                queue: VecDeque::new(),
                last_time: 0,
            },
        );
        info!("Property observer installed on {}", target);
        Ok(ObserverHandle { target, id })
    }

    fn submit_marker(
        &mut self,
        observer: &ObserverHandle,
        token: AckToken,
    ) -> Result<(), SubmitError> {
        let display = self.display();
        let Some(obs) = self.observers.get_mut(&observer.id) else {
            return Err(SubmitError::Platform("observer not installed".into()));
        };
        obs.queue.push_back(token);
        let data: [c_long; 1] = [token.raw() as c_long];
        unsafe {
            XChangeProperty(
                display,
                observer.target.raw() as Window,
                self.ack_atom,
                XA_INTEGER,
                32,
                PropModeReplace,
                data.as_ptr().cast(),
                1,
            );
            XFlush(display);
        }
        Ok(())
    }

    fn uninstall_observer(&mut self, observer: ObserverHandle) {
        if let Some(obs) = self.observers.remove(&observer.id) {
            unsafe {
                XSelectInput(self.display(), obs.target.raw() as Window, NoEventMask);
                XDeleteProperty(self.display(), obs.target.raw() as Window, self.ack_atom);
                XFlush(self.display());
            }
            LAST_ERROR.store(0, Ordering::SeqCst);
            info!("Property observer on {} uninstalled", obs.target);
        }
    }

    fn pump(&mut self) {
        let display = self.display();
        while unsafe { XPending(display) } > 0 {
            let mut event: XEvent = unsafe { std::mem::zeroed() };
            unsafe {
                XNextEvent(display, &mut event);
            }
            if event.get_type() == PropertyNotify {
                let property = unsafe { event.property };
                self.observe(&property);
            }
        }
    }

    fn has_pending(&mut self, target: TargetHandle) -> bool {
        self.observers
            .values()
            .any(|o| o.target == target && !o.queue.is_empty())
    }

    fn pointer_sink(&self) -> Option<Arc<dyn PointerSink>> {
        match Connection::open() {
            Ok(conn) => Some(Arc::new(X11PointerSink {
                conn: Mutex::new(conn),
                mode: self.mode,
                root: self.root,
            })),
            Err(e) => {
                debug!("No pointer sink: {}", e);
                None
            }
        }
    }
}

/// Own connection for the reassertion thread.
struct X11PointerSink {
    conn: Mutex<Connection>,
    mode: DeliveryMode,
    root: Window,
}

impl PointerSink for X11PointerSink {
    fn reassert(&self, record: &PointerRecord) -> Result<(), SubmitError> {
        let conn = self.conn.lock();
        let display = conn.0;
        let window = record.target.raw() as Window;
        let (mut x, mut y, mut child) = (0, 0, 0);
        let ok = unsafe {
            XTranslateCoordinates(
                display,
                window,
                self.root,
                record.position.x,
                record.position.y,
                &mut x,
                &mut y,
                &mut child,
            )
        };
        if ok == 0 {
            return Err(SubmitError::TargetGone(record.target.raw()));
        }
        unsafe {
            match self.mode {
                DeliveryMode::XTest => {
                    XTestFakeMotionEvent(display, -1, x, y, CurrentTime);
                }
                DeliveryMode::SendEvent => {
                    let motion = XMotionEvent {
                        type_: MotionNotify,
                        serial: 0,
                        send_event: True,
                        display,
                        window,
                        root: self.root,
                        subwindow: 0,
                        time: CurrentTime,
                        x: record.position.x,
                        y: record.position.y,
                        x_root: x,
                        y_root: y,
                        state: state_mask(Modifiers::none(), record.buttons),
                        is_hint: 0,
                        same_screen: True,
                    };
                    let mut xevent = XEvent { motion };
                    XSendEvent(display, window, True, PointerMotionMask, &mut xevent);
                }
            }
            XFlush(display);
        }
        Ok(())
    }
}

fn button_number(button: PointerButton) -> c_uint {
    match button {
        PointerButton::Left => 1,
        PointerButton::Middle => 2,
        PointerButton::Right => 3,
    }
}

fn state_mask(modifiers: Modifiers, buttons: ButtonMask) -> c_uint {
    let mut state = 0;
    if modifiers.shift {
        state |= ShiftMask;
    }
    if modifiers.control {
        state |= ControlMask;
    }
    if modifiers.alt {
        state |= Mod1Mask;
    }
    if buttons.contains(PointerButton::Left) {
        state |= Button1Mask;
    }
    if buttons.contains(PointerButton::Middle) {
        state |= Button2Mask;
    }
    if buttons.contains(PointerButton::Right) {
        state |= Button3Mask;
    }
    state
}
