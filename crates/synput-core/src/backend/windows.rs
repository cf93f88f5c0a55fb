//! Win32 delivery: window messages posted to the target, or the OS input queue.

use super::{DeliveryBackend, ObserverHandle};
use crate::ack::{AckRegistry, AckToken};
use crate::error::{InputError, SubmitError};
use crate::hover::{PointerRecord, PointerSink};
use crate::layout::{KeyboardLayout, WindowsLayout};
use crate::types::{
    ButtonMask, EventClass, KeyCode, Modifiers, NativeEvent, NativeInput, Point, PointerButton,
    TargetHandle,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, trace};
use windows::core::w;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{GetCurrentProcessId, GetCurrentThreadId};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    MapVirtualKeyW, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, KEYEVENTF_SCANCODE, KEYEVENTF_UNICODE,
    MAPVK_VK_TO_VSC, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetSystemMetrics, GetWindowThreadProcessId, IsWindow,
    PeekMessageW, PostMessageW, PostThreadMessageW, RegisterWindowMessageW, SetWindowsHookExW,
    TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, MSG, PM_REMOVE, SM_CXSCREEN,
    SM_CYSCREEN, WH_GETMESSAGE, WH_KEYBOARD_LL, WM_CHAR, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDBLCLK,
    WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDBLCLK, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEMOVE,
    WM_NULL, WM_RBUTTONDBLCLK, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

/// Magic number to identify our own injected events.
const INJECTED_EXTRA_INFO: usize = 0xFFC3C3C3;
/// Tags the marker keystroke so the low-level hook can swallow it.
const MARKER_EXTRA_INFO: usize = 0xFFC3A5A5;
/// Unassigned virtual key used for marker keystrokes.
const MARKER_VK: u16 = 0xE8;

const MK_LBUTTON: usize = 0x0001;
const MK_RBUTTON: usize = 0x0002;
const MK_SHIFT: usize = 0x0004;
const MK_CONTROL: usize = 0x0008;
const MK_MBUTTON: usize = 0x0010;

lazy_static::lazy_static! {
    /// Marker posted behind real messages; wParam token, lParam caller thread.
    static ref MARKER_MSG: u32 = unsafe { RegisterWindowMessageW(w!("SYNPUT_MARKER")) };
    /// Reply posted by the observer back to the waiting thread; wParam token.
    static ref ACK_MSG: u32 = unsafe { RegisterWindowMessageW(w!("SYNPUT_ACK")) };
    /// Low-level hook state: tokens of marker keystrokes in the order they were sent.
    static ref LL_MARKERS: Mutex<Option<LlObserver>> = Mutex::new(None);
}

struct LlObserver {
    hook: HHOOK,
    sink: AckRegistry,
    queue: VecDeque<AckToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    PostMessage,
    SendInput,
}

struct MessageObserver {
    hook: HHOOK,
    target: TargetHandle,
    sink: AckRegistry,
}

pub struct WindowsBackend {
    mode: DeliveryMode,
    observers: HashMap<u64, MessageObserver>,
    in_flight: HashMap<u64, TargetHandle>,
    next_observer: u64,
}

impl WindowsBackend {
    pub fn new(mode: DeliveryMode) -> Result<Self, InputError> {
        if *MARKER_MSG == 0 || *ACK_MSG == 0 {
            return Err(InputError::Backend(
                "RegisterWindowMessageW failed".into(),
            ));
        }
        info!("Windows backend in {:?} mode", mode);
        Ok(Self {
            mode,
            observers: HashMap::new(),
            in_flight: HashMap::new(),
            next_observer: 1,
        })
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    fn post(&self, target: TargetHandle, msg: u32, wparam: usize, lparam: isize) -> Result<(), SubmitError> {
        unsafe { PostMessageW(hwnd(target), msg, WPARAM(wparam), LPARAM(lparam)) }
            .map_err(|e| post_error(target, e))
    }

    fn post_key(&self, event: &NativeEvent, key: KeyCode) -> Result<(), SubmitError> {
        let up = event.class == EventClass::KeyUp;
        let alt = alt_down(key, event.modifiers);
        let sys = is_sys_key(key, event.modifiers);
        let msg = match (up, sys) {
            (false, false) => WM_KEYDOWN,
            (true, false) => WM_KEYUP,
            (false, true) => WM_SYSKEYDOWN,
            (true, true) => WM_SYSKEYUP,
        };
        let scan = unsafe { MapVirtualKeyW(u32::from(key.vk), MAPVK_VK_TO_VSC) };
        self.post(event.target, msg, usize::from(key.vk), key_lparam(scan, key.ext, up, alt))
    }

    fn post_char(&self, event: &NativeEvent, c: char) -> Result<(), SubmitError> {
        // WM_CHAR carries the whole stroke; the up half has nothing to post.
        if event.class != EventClass::KeyDown {
            return Ok(());
        }
        let mut buf = [0u16; 2];
        for unit in c.encode_utf16(&mut buf) {
            self.post(event.target, WM_CHAR, usize::from(*unit), 1)?;
        }
        Ok(())
    }

    fn post_pointer(&self, event: &NativeEvent) -> Result<(), SubmitError> {
        let at = event.position.unwrap_or_default();
        let msg = match (event.class, event.input) {
            (EventClass::PointerMove, _) => WM_MOUSEMOVE,
            (class, NativeInput::Button(b)) => button_message(class, b),
            _ => return Err(SubmitError::Unsupported("pointer event without a button")),
        };
        self.post(
            event.target,
            msg,
            mk_flags(event.modifiers, event.buttons),
            point_lparam(at),
        )
    }

    fn send_pointer(&self, event: &NativeEvent) -> Result<(), SubmitError> {
        let at = event.position.unwrap_or_default();
        let flags = match (event.class, event.input) {
            (EventClass::PointerMove, _) => MOUSE_EVENT_FLAGS(0),
            // The input queue derives double clicks from timing.
            (EventClass::PointerDoubleClick, _) => return Ok(()),
            (class, NativeInput::Button(b)) => button_flags(class, b),
            _ => return Err(SubmitError::Unsupported("pointer event without a button")),
        };
        inject_mouse(event.target, at, flags)
    }

    fn install_message_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError> {
        let mut pid = 0u32;
        let thread = unsafe { GetWindowThreadProcessId(hwnd(target), Some(&mut pid as *mut u32)) };
        if thread == 0 {
            return Err(SubmitError::TargetGone(target.raw()));
        }
        // The hook procedure lives in this executable, not a DLL.
        if pid != unsafe { GetCurrentProcessId() } {
            return Err(SubmitError::Unsupported("message observer on another process"));
        }
        let module = unsafe { GetModuleHandleW(None) }
            .map_err(|e| SubmitError::Platform(e.to_string()))?;
        let hook = unsafe {
            SetWindowsHookExW(
                WH_GETMESSAGE,
                Some(get_message_proc),
                HINSTANCE(module.0),
                thread,
            )
        }
        .map_err(|e| SubmitError::Platform(format!("SetWindowsHookExW: {}", e)))?;

        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.insert(id, MessageObserver { hook, target, sink });
        info!("Message observer installed on {} (thread {})", target, thread);
        Ok(ObserverHandle { target, id })
    }

    fn install_ll_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError> {
        let mut slot = LL_MARKERS.lock();
        if slot.is_none() {
            // Low-level hooks require hMod to be NULL if threadId is 0.
            let hook = unsafe {
                SetWindowsHookExW(WH_KEYBOARD_LL, Some(ll_keyboard_proc), HINSTANCE::default(), 0)
            }
            .map_err(|e| SubmitError::Platform(format!("SetWindowsHookExW: {}", e)))?;
            *slot = Some(LlObserver {
                hook,
                sink,
                queue: VecDeque::new(),
            });
            info!("Low-level marker hook installed. Handle: {:?}", hook);
        }
        let id = self.next_observer;
        self.next_observer += 1;
        Ok(ObserverHandle { target, id })
    }
}

impl DeliveryBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        match self.mode {
            DeliveryMode::PostMessage => "post-message",
            DeliveryMode::SendInput => "send-input",
        }
    }

    fn validate_target(&self, target: TargetHandle) -> Result<(), InputError> {
        if unsafe { IsWindow(hwnd(target)) }.as_bool() {
            Ok(())
        } else {
            Err(InputError::InvalidTarget(target.raw()))
        }
    }

    fn layout(&self) -> Arc<dyn KeyboardLayout> {
        Arc::new(WindowsLayout)
    }

    fn submit(&mut self, event: &NativeEvent) -> Result<(), SubmitError> {
        trace!("{:?} {:?} -> {}", event.class, event.input, event.target);
        match (self.mode, event.input) {
            (DeliveryMode::PostMessage, NativeInput::Key(key)) => self.post_key(event, key),
            (DeliveryMode::PostMessage, NativeInput::Unicode(c)) => self.post_char(event, c),
            (DeliveryMode::PostMessage, _) => self.post_pointer(event),
            (DeliveryMode::SendInput, NativeInput::Key(key)) => {
                let sc = unsafe { MapVirtualKeyW(u32::from(key.vk), MAPVK_VK_TO_VSC) } as u16;
                inject_scancode(sc, key.ext, event.class == EventClass::KeyUp)
            }
            (DeliveryMode::SendInput, NativeInput::Unicode(c)) => {
                inject_unicode(c, event.class == EventClass::KeyUp)
            }
            (DeliveryMode::SendInput, _) => self.send_pointer(event),
        }
    }

    fn install_observer(
        &mut self,
        target: TargetHandle,
        sink: AckRegistry,
    ) -> Result<ObserverHandle, SubmitError> {
        match self.mode {
            DeliveryMode::PostMessage => self.install_message_observer(target, sink),
            DeliveryMode::SendInput => self.install_ll_observer(target, sink),
        }
    }

    fn submit_marker(
        &mut self,
        observer: &ObserverHandle,
        token: AckToken,
    ) -> Result<(), SubmitError> {
        match self.mode {
            DeliveryMode::PostMessage => {
                if !self.observers.contains_key(&observer.id) {
                    return Err(SubmitError::Platform("observer not installed".into()));
                }
                let caller = unsafe { GetCurrentThreadId() };
                self.post(
                    observer.target,
                    *MARKER_MSG,
                    token.raw() as usize,
                    caller as isize,
                )?;
            }
            DeliveryMode::SendInput => {
                if let Some(ll) = LL_MARKERS.lock().as_mut() {
                    ll.queue.push_back(token);
                }
                let sent = send_keyboard(KEYBDINPUT {
                    wVk: VIRTUAL_KEY(MARKER_VK),
                    wScan: 0,
                    dwFlags: KEYEVENTF_KEYUP,
                    time: 0,
                    dwExtraInfo: MARKER_EXTRA_INFO,
                });
                if let Err(e) = sent {
                    if let Some(ll) = LL_MARKERS.lock().as_mut() {
                        ll.queue.retain(|t| *t != token);
                    }
                    return Err(e);
                }
            }
        }
        self.in_flight.insert(token.raw(), observer.target);
        Ok(())
    }

    fn uninstall_observer(&mut self, observer: ObserverHandle) {
        self.in_flight.retain(|_, t| *t != observer.target);
        match self.mode {
            DeliveryMode::PostMessage => {
                if let Some(obs) = self.observers.remove(&observer.id) {
                    unsafe {
                        let _ = UnhookWindowsHookEx(obs.hook);
                    }
                    info!("Message observer on {} uninstalled", obs.target);
                }
            }
            DeliveryMode::SendInput => {
                if !self.in_flight.is_empty() {
                    return;
                }
                if let Some(ll) = LL_MARKERS.lock().take() {
                    unsafe {
                        let _ = UnhookWindowsHookEx(ll.hook);
                    }
                    info!("Low-level marker hook uninstalled.");
                }
            }
        }
    }

    fn pump(&mut self) {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.hwnd.0 == 0 && msg.message == *ACK_MSG {
                    let token = msg.wParam.0 as u64;
                    if let Some(target) = self.in_flight.remove(&token) {
                        if let Some(obs) = self.observers.values().find(|o| o.target == target) {
                            obs.sink.acknowledge(AckToken::from_raw(token));
                        }
                    }
                    continue;
                }
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        if self.mode == DeliveryMode::SendInput {
            // The hook resolves tokens itself; drop the ones it has consumed.
            let queued: Vec<u64> = LL_MARKERS
                .lock()
                .as_ref()
                .map(|ll| ll.queue.iter().map(|t| t.raw()).collect())
                .unwrap_or_default();
            self.in_flight.retain(|token, _| queued.contains(token));
        }
    }

    fn has_pending(&mut self, target: TargetHandle) -> bool {
        self.in_flight.values().any(|t| *t == target)
    }

    fn pointer_sink(&self) -> Option<Arc<dyn PointerSink>> {
        Some(Arc::new(WindowsPointerSink { mode: self.mode }))
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        for (_, obs) in self.observers.drain() {
            unsafe {
                let _ = UnhookWindowsHookEx(obs.hook);
            }
        }
        if let Some(ll) = LL_MARKERS.lock().take() {
            unsafe {
                let _ = UnhookWindowsHookEx(ll.hook);
            }
        }
    }
}

struct WindowsPointerSink {
    mode: DeliveryMode,
}

impl PointerSink for WindowsPointerSink {
    fn reassert(&self, record: &PointerRecord) -> Result<(), SubmitError> {
        match self.mode {
            DeliveryMode::PostMessage => unsafe {
                PostMessageW(
                    hwnd(record.target),
                    WM_MOUSEMOVE,
                    WPARAM(mk_flags(Modifiers::none(), record.buttons)),
                    LPARAM(point_lparam(record.position)),
                )
            }
            .map_err(|e| post_error(record.target, e)),
            DeliveryMode::SendInput => {
                inject_mouse(record.target, record.position, MOUSE_EVENT_FLAGS(0))
            }
        }
    }
}

fn hwnd(target: TargetHandle) -> HWND {
    HWND(target.raw() as isize)
}

fn post_error(target: TargetHandle, e: windows::core::Error) -> SubmitError {
    if unsafe { IsWindow(hwnd(target)) }.as_bool() {
        SubmitError::QueueRejected
    } else {
        debug!("PostMessageW to {} failed: {}", target, e);
        SubmitError::TargetGone(target.raw())
    }
}

const VK_MENU: u16 = 0x12;

/// Alt is held for this stroke. The Alt key's own edges count, including its
/// release, whose mask no longer carries alt.
fn alt_down(key: KeyCode, modifiers: Modifiers) -> bool {
    modifiers.alt || key.vk == VK_MENU
}

/// WM_SYSKEY* applies while alt is held without control; control+alt (AltGr)
/// keystrokes arrive as ordinary WM_KEY* messages.
fn is_sys_key(key: KeyCode, modifiers: Modifiers) -> bool {
    alt_down(key, modifiers) && !modifiers.control
}

/// Keystroke lParam: repeat count, scan code, extended, context and transition bits.
fn key_lparam(scan: u32, ext: bool, up: bool, alt: bool) -> isize {
    let mut lp: u32 = 1 | ((scan & 0xFF) << 16);
    if ext {
        lp |= 1 << 24;
    }
    if alt {
        lp |= 1 << 29;
    }
    if up {
        lp |= (1 << 30) | (1 << 31);
    }
    lp as i32 as isize
}

fn point_lparam(at: Point) -> isize {
    let x = (at.x as u32) & 0xFFFF;
    let y = (at.y as u32) & 0xFFFF;
    ((y << 16) | x) as i32 as isize
}

fn mk_flags(modifiers: Modifiers, buttons: ButtonMask) -> usize {
    let mut flags = 0;
    if buttons.contains(PointerButton::Left) {
        flags |= MK_LBUTTON;
    }
    if buttons.contains(PointerButton::Right) {
        flags |= MK_RBUTTON;
    }
    if buttons.contains(PointerButton::Middle) {
        flags |= MK_MBUTTON;
    }
    if modifiers.shift {
        flags |= MK_SHIFT;
    }
    if modifiers.control {
        flags |= MK_CONTROL;
    }
    flags
}

fn button_message(class: EventClass, button: PointerButton) -> u32 {
    match (class, button) {
        (EventClass::PointerDown, PointerButton::Left) => WM_LBUTTONDOWN,
        (EventClass::PointerDown, PointerButton::Middle) => WM_MBUTTONDOWN,
        (EventClass::PointerDown, PointerButton::Right) => WM_RBUTTONDOWN,
        (EventClass::PointerDoubleClick, PointerButton::Left) => WM_LBUTTONDBLCLK,
        (EventClass::PointerDoubleClick, PointerButton::Middle) => WM_MBUTTONDBLCLK,
        (EventClass::PointerDoubleClick, PointerButton::Right) => WM_RBUTTONDBLCLK,
        (_, PointerButton::Left) => WM_LBUTTONUP,
        (_, PointerButton::Middle) => WM_MBUTTONUP,
        (_, PointerButton::Right) => WM_RBUTTONUP,
    }
}

fn button_flags(class: EventClass, button: PointerButton) -> MOUSE_EVENT_FLAGS {
    let down = class == EventClass::PointerDown;
    match (button, down) {
        (PointerButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
        (PointerButton::Left, false) => MOUSEEVENTF_LEFTUP,
        (PointerButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
        (PointerButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        (PointerButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
        (PointerButton::Right, false) => MOUSEEVENTF_RIGHTUP,
    }
}

/// Runs in the target's thread for every message it retrieves.
unsafe extern "system" fn get_message_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let msg = &mut *(lparam.0 as *mut MSG);
        if msg.message == *MARKER_MSG {
            let token = msg.wParam.0;
            let caller = msg.lParam.0 as u32;
            let _ = PostThreadMessageW(caller, *ACK_MSG, WPARAM(token), LPARAM(0));
            // Neutralise the marker so the window procedure never sees it.
            msg.message = WM_NULL;
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}

unsafe extern "system" fn ll_keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code < 0 {
        return CallNextHookEx(None, code, wparam, lparam);
    }

    let kbd = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
    if kbd.dwExtraInfo != MARKER_EXTRA_INFO {
        return CallNextHookEx(None, code, wparam, lparam);
    }

    if let Some(ll) = LL_MARKERS.lock().as_mut() {
        if let Some(token) = ll.queue.pop_front() {
            ll.sink.acknowledge(token);
        }
    }
    LRESULT(1) // Block marker
}

fn send_keyboard(ki: KEYBDINPUT) -> Result<(), SubmitError> {
    let input = INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 { ki },
    };
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 0 {
        error!("SendInput rejected keyboard input");
        return Err(SubmitError::QueueRejected);
    }
    Ok(())
}

/// Inject a key event (scancode).
/// up: true for KeyUp, false for KeyDown.
pub fn inject_scancode(sc: u16, ext: bool, up: bool) -> Result<(), SubmitError> {
    let mut flags = KEYEVENTF_SCANCODE;
    if ext {
        flags |= KEYEVENTF_EXTENDEDKEY;
    }
    if up {
        flags |= KEYEVENTF_KEYUP;
    }
    send_keyboard(KEYBDINPUT {
        wVk: VIRTUAL_KEY(0),
        wScan: sc,
        dwFlags: flags,
        time: 0,
        dwExtraInfo: INJECTED_EXTRA_INFO,
    })
}

/// Inject a unicode character, one UTF-16 unit at a time.
pub fn inject_unicode(c: char, up: bool) -> Result<(), SubmitError> {
    let mut flags = KEYEVENTF_UNICODE;
    if up {
        flags |= KEYEVENTF_KEYUP;
    }

    let mut buf = [0; 2];
    for code_unit in c.encode_utf16(&mut buf) {
        send_keyboard(KEYBDINPUT {
            wVk: VIRTUAL_KEY(0),
            wScan: *code_unit,
            dwFlags: flags,
            time: 0,
            dwExtraInfo: INJECTED_EXTRA_INFO,
        })?;
    }
    Ok(())
}

/// Absolute pointer input at client coordinates of `target`.
fn inject_mouse(target: TargetHandle, at: Point, buttons: MOUSE_EVENT_FLAGS) -> Result<(), SubmitError> {
    let mut pt = POINT { x: at.x, y: at.y };
    if !unsafe { ClientToScreen(hwnd(target), &mut pt) }.as_bool() {
        return Err(SubmitError::TargetGone(target.raw()));
    }
    let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
    if w <= 1 || h <= 1 {
        return Err(SubmitError::Platform("screen metrics unavailable".into()));
    }
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: pt.x * 65535 / (w - 1),
                dy: pt.y * 65535 / (h - 1),
                mouseData: 0,
                dwFlags: MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE | buttons,
                time: 0,
                dwExtraInfo: INJECTED_EXTRA_INFO,
            },
        },
    };
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 0 {
        return Err(SubmitError::QueueRejected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lparam_bits() {
        let down = key_lparam(0x1E, false, false, false);
        assert_eq!(down, 0x001E_0001);
        let up = key_lparam(0x1E, true, true, false) as u32;
        assert_eq!(up & (1 << 24), 1 << 24);
        assert_eq!(up >> 30, 0b11);
        let sys = key_lparam(0x1E, false, false, true) as u32;
        assert_ne!(sys & (1 << 29), 0);
    }

    #[test]
    fn test_sys_key_classification() {
        let a = KeyCode::new(0x41, false);
        let alt = Modifiers { shift: false, control: false, alt: true };
        let alt_gr = Modifiers { shift: false, control: true, alt: true };
        assert!(is_sys_key(a, alt));
        assert!(!is_sys_key(a, alt_gr));
        assert!(!is_sys_key(a, Modifiers::none()));
        // Releasing Alt itself: the mask is already cleared.
        assert!(is_sys_key(KeyCode::new(VK_MENU, false), Modifiers::none()));
        assert!(!is_sys_key(
            KeyCode::new(VK_MENU, false),
            Modifiers { shift: false, control: true, alt: false }
        ));
    }

    #[test]
    fn test_point_lparam_negative() {
        let lp = point_lparam(Point::new(-1, 2)) as u32;
        assert_eq!(lp & 0xFFFF, 0xFFFF);
        assert_eq!(lp >> 16, 2);
    }

    #[test]
    fn test_mk_flags() {
        let buttons = ButtonMask::empty().with(PointerButton::Left);
        let mods = Modifiers { shift: true, control: false, alt: false };
        assert_eq!(mk_flags(mods, buttons), MK_LBUTTON | MK_SHIFT);
    }

    #[test]
    fn test_double_click_message() {
        assert_eq!(
            button_message(EventClass::PointerDoubleClick, PointerButton::Left),
            WM_LBUTTONDBLCLK
        );
        assert_eq!(button_message(EventClass::PointerUp, PointerButton::Right), WM_RBUTTONUP);
    }
}
